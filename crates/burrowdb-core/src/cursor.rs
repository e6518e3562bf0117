//! Module: cursor
//! Responsibility: ordered range scans with bounds, pagination, direction,
//! and stride, robust against deletions that land mid-scan.
//! Does not own: index selection or mutation; collections construct cursors
//! and hand them the maps to walk.
//! Boundary: every step is one neighbor lookup on the scanned map keyed by
//! a remembered key value, so a concurrently removed entry never strands
//! the scan.

use crate::{
    codec::Codec,
    error::Error,
    key::{Key, prefix_successor},
    kv::{BackendError, KvMap},
    obs::{self, MetricsEvent},
};
use std::{cmp::Ordering, sync::Arc};
use thiserror::Error as ThisError;

///
/// CursorError
///

#[derive(Debug, ThisError)]
pub enum CursorError {
    #[error("stride must be positive (got {stride})")]
    BadStride { stride: u64 },

    #[error("cursor is exhausted")]
    Exhausted,
}

///
/// Scan
///
/// Range-scan parameters. The defaults walk an entire index forward one
/// entry at a time: bounds `Key::Start..Key::End`, no skip, no limit,
/// stride 1.
///

#[derive(Clone, Debug)]
pub struct Scan {
    pub(crate) lower: Key,
    pub(crate) upper: Key,
    pub(crate) start: u64,
    pub(crate) count: Option<u64>,
    pub(crate) reverse: bool,
    pub(crate) stride: u64,
}

impl Scan {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            lower: Key::Start,
            upper: Key::End,
            start: 0,
            count: None,
            reverse: false,
            stride: 1,
        }
    }

    /// Inclusive lower bound; a prefix admits every key extending it.
    #[must_use]
    pub fn lower(mut self, key: impl Into<Key>) -> Self {
        self.lower = key.into();
        self
    }

    /// Inclusive upper bound; a prefix admits every key extending it.
    #[must_use]
    pub fn upper(mut self, key: impl Into<Key>) -> Self {
        self.upper = key.into();
        self
    }

    /// Physical positions to skip before the first yield.
    #[must_use]
    pub const fn start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Maximum number of elements to yield.
    #[must_use]
    pub const fn count(mut self, count: u64) -> Self {
        self.count = Some(count);
        self
    }

    #[must_use]
    pub const fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    /// Physical entries advanced per yielded element; must be positive.
    #[must_use]
    pub const fn stride(mut self, stride: u64) -> Self {
        self.stride = stride;
        self
    }
}

impl Default for Scan {
    fn default() -> Self {
        Self::all()
    }
}

/// Smallest physical key admitted by the lower bound.
pub(crate) fn resolve_lower_key(
    map: &dyn KvMap,
    lower: &Key,
) -> Result<Option<Vec<u8>>, BackendError> {
    match lower {
        Key::Start => map.first_key(),
        Key::End => map.last_key(),
        Key::Bytes(bytes) => map.ceiling_key(bytes),
    }
}

/// Largest physical key admitted by the upper bound: the last key at or
/// below the bound, or extending it as a prefix.
pub(crate) fn resolve_upper_key(
    map: &dyn KvMap,
    upper: &Key,
) -> Result<Option<Vec<u8>>, BackendError> {
    match upper {
        Key::End => map.last_key(),
        Key::Start => map.first_key(),
        Key::Bytes(bytes) => match prefix_successor(bytes) {
            Some(successor) => map.lower_key(&successor),
            // Every key below an all-0xFF bound either sorts below it or
            // extends it, so the admitted range is unbounded above.
            None => map.last_key(),
        },
    }
}

pub(crate) fn upper_admits(upper: &Key, key: &[u8]) -> bool {
    upper.cmp_bytes(key) != Ordering::Less || upper.is_prefix_of_bytes(key)
}

pub(crate) fn lower_admits(lower: &Key, key: &[u8]) -> bool {
    lower.cmp_bytes(key) != Ordering::Greater || lower.is_prefix_of_bytes(key)
}

///
/// Cursor
///
/// Single-pass pull iterator over one index map. Secondary scans carry the
/// primary map for indirection: the scanned value bytes are the primary
/// key, and a missing primary row means the element died mid-scan and is
/// skipped without charging the limit.
///
/// Not thread-safe itself; safe against concurrent mutation of the maps it
/// walks. Termination relies on the bound check, never on the far endpoint
/// staying alive.
///

pub struct Cursor<C: Codec> {
    collection: Arc<str>,
    codec: Arc<C>,
    scan_map: Arc<dyn KvMap>,
    primary_map: Option<Arc<dyn KvMap>>,
    lower: Key,
    upper: Key,
    reverse: bool,
    stride: u64,
    remaining: Option<u64>,
    position: Option<Vec<u8>>,
    end_key: Option<Vec<u8>>,
    peeked: Option<(Key, C::Item)>,
}

impl<C: Codec> std::fmt::Debug for Cursor<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.collection)
            .field("lower", &self.lower)
            .field("upper", &self.upper)
            .field("reverse", &self.reverse)
            .field("stride", &self.stride)
            .field("remaining", &self.remaining)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> Cursor<C> {
    pub(crate) fn new(
        collection: Arc<str>,
        codec: Arc<C>,
        scan_map: Arc<dyn KvMap>,
        primary_map: Option<Arc<dyn KvMap>>,
        scan: Scan,
    ) -> Result<Self, Error> {
        if scan.stride == 0 {
            return Err(CursorError::BadStride { stride: scan.stride }.into());
        }

        let lower_key = resolve_lower_key(scan_map.as_ref(), &scan.lower)?;
        let upper_key = resolve_upper_key(scan_map.as_ref(), &scan.upper)?;
        let (entry_key, end_key) = if scan.reverse {
            (upper_key, lower_key)
        } else {
            (lower_key, upper_key)
        };

        let mut cursor = Self {
            collection,
            codec,
            scan_map,
            primary_map,
            lower: scan.lower,
            upper: scan.upper,
            reverse: scan.reverse,
            stride: scan.stride,
            remaining: scan.count,
            position: None,
            end_key,
            peeked: None,
        };

        // The scan is non-empty only when both endpoints resolved and sit
        // in traversal order; a lower bound past the admitted range shows
        // up here as crossed endpoints.
        let ordered = match (entry_key.as_deref(), cursor.end_key.as_deref()) {
            (Some(entry), Some(end)) => {
                if cursor.reverse {
                    entry >= end
                } else {
                    entry <= end
                }
            }
            _ => false,
        };
        if ordered {
            cursor.position = entry_key;
        }

        // Consume `start` physical positions before the first yield.
        for _ in 0..scan.start {
            let Some(key) = cursor.position.take() else {
                break;
            };
            cursor.position = cursor.advance_one(&key)?;
        }

        Ok(cursor)
    }

    /// Pull the next live element; `Ok(None)` once exhausted (fused).
    pub fn next_entry(&mut self) -> Result<Option<C::Item>, Error> {
        Ok(self.next_with_key()?.map(|(_, item)| item))
    }

    /// Pull the next live element together with its primary key.
    pub(crate) fn next_with_key(&mut self) -> Result<Option<(Key, C::Item)>, Error> {
        if let Some(entry) = self.peeked.take() {
            return Ok(Some(entry));
        }

        loop {
            if self.remaining == Some(0) {
                return Ok(None);
            }
            let Some(key) = self.position.clone() else {
                return Ok(None);
            };

            let resolved = self.resolve_entry(&key)?;
            self.position = self.advance_stride(&key)?;

            match resolved {
                Some(entry) => {
                    if let Some(remaining) = &mut self.remaining {
                        *remaining -= 1;
                    }
                    return Ok(Some(entry));
                }
                None => {
                    // The row died between observation and dereference:
                    // skip silently, do not charge the limit.
                    obs::record(MetricsEvent::DeadEntrySkipped {
                        collection: &self.collection,
                    });
                }
            }
        }
    }

    /// True iff another element exists. No observable side effects: the
    /// element found is memoized and handed to the next pull.
    pub fn has_next(&mut self) -> Result<bool, Error> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        match self.next_with_key()? {
            Some(entry) => {
                self.peeked = Some(entry);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pull the next element, failing with [`CursorError::Exhausted`] past
    /// the end.
    pub fn expect_next(&mut self) -> Result<C::Item, Error> {
        match self.next_entry()? {
            Some(item) => Ok(item),
            None => Err(CursorError::Exhausted.into()),
        }
    }

    /// Dereference one physical entry; `None` marks a dead element.
    fn resolve_entry(&self, key: &[u8]) -> Result<Option<(Key, C::Item)>, Error> {
        let Some(value) = self.scan_map.get(key)? else {
            return Ok(None);
        };

        match &self.primary_map {
            Some(primary) => {
                let Some(row) = primary.get(&value)? else {
                    return Ok(None);
                };
                let pk = Key::from_bytes(value);
                let item = self.codec.decode(&row, Some(&pk))?;
                Ok(Some((pk, item)))
            }
            None => {
                let pk = Key::from_bytes(key.to_vec());
                let item = self.codec.decode(&value, Some(&pk))?;
                Ok(Some((pk, item)))
            }
        }
    }

    fn advance_stride(&self, from: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let mut key = from.to_vec();
        for _ in 0..self.stride {
            match self.advance_one(&key)? {
                Some(next) => key = next,
                None => return Ok(None),
            }
        }

        Ok(Some(key))
    }

    /// One physical step. Terminates on the remembered far endpoint, on
    /// map exhaustion, or on a neighbor past the configured bound, so a
    /// deleted endpoint cannot extend the scan.
    fn advance_one(&self, from: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        if self.end_key.as_deref() == Some(from) {
            return Ok(None);
        }

        let next = if self.reverse {
            self.scan_map.lower_key(from)?
        } else {
            self.scan_map.higher_key(from)?
        };
        let Some(next) = next else {
            return Ok(None);
        };

        let admitted = if self.reverse {
            lower_admits(&self.lower, &next)
        } else {
            upper_admits(&self.upper, &next)
        };

        Ok(admitted.then_some(next))
    }
}

impl<C: Codec> Iterator for Cursor<C> {
    type Item = Result<C::Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

///
/// TESTS
///
/// Bound-resolution helpers are exercised here against a bare map; full
/// cursor behavior is covered by the collection tests and the scenario
/// suite, where a codec exists.
///
