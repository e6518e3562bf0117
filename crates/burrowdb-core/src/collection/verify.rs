//! Module: collection::verify
//! Responsibility: offline reconciliation of secondary maps against the
//! primary map.
//! Multi-index writes run outside a backend transaction, so a crash inside
//! one mutation can strand at most one operation's worth of divergence.
//! This pass finds it: entries pointing at absent rows, and rows missing
//! their index entries.

use crate::{codec::Codec, collection::Collection, error::Error, key::Key};

///
/// IntegrityReport
///
/// Outcome of one reconciliation pass over the ordered secondary maps.
///

#[derive(Debug, Default)]
pub struct IntegrityReport {
    /// Secondary entries whose value names a primary key with no row, as
    /// `(index name, stored key)`.
    pub dangling: Vec<(String, Vec<u8>)>,
    /// Rows whose derived entry is absent from a secondary map, as
    /// `(index name, primary key)`.
    pub missing: Vec<(String, Key)>,
    /// True when the divergence found was also written back.
    pub repaired: bool,
}

impl IntegrityReport {
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.dangling.is_empty() && self.missing.is_empty()
    }
}

impl<C: Codec> Collection<C> {
    /// Reconcile every ordered secondary map against the primary map.
    ///
    /// With `repair` set, dangling entries are removed and missing entries
    /// re-derived from the stored rows. Run this only while no other
    /// writer is active.
    pub fn verify_integrity(&self, repair: bool) -> Result<IntegrityReport, Error> {
        let mut report = IntegrityReport::default();
        let primary_map = self.primary_map()?;

        // Pass 1: secondary entries must point at live rows.
        for index in &self.codec.indices()[1..] {
            let map = self.ordered_map(index)?;
            let mut position = map.first_key()?;
            while let Some(stored) = position {
                position = map.higher_key(&stored)?;
                let Some(pk_bytes) = map.get(&stored)? else {
                    continue;
                };
                if !primary_map.contains_key(&pk_bytes)? {
                    if repair {
                        map.remove(&stored)?;
                    }
                    report.dangling.push((index.name().to_string(), stored));
                }
            }
        }

        // Pass 2: every row must be reachable from every secondary.
        let mut position = primary_map.first_key()?;
        while let Some(pk_bytes) = position {
            position = primary_map.higher_key(&pk_bytes)?;
            let Some(row) = primary_map.get(&pk_bytes)? else {
                continue;
            };
            let pk = Key::from_bytes(pk_bytes.clone());
            let data = self.codec.decode(&row, Some(&pk))?;

            for index in &self.codec.indices()[1..] {
                let map = self.ordered_map(index)?;
                let stored = self.stored_key(index, &data, &pk_bytes)?;
                if !map.contains_key(&stored)? {
                    if repair {
                        map.put(&stored, &pk_bytes)?;
                    }
                    report.missing.push((index.name().to_string(), pk.clone()));
                }
            }
        }

        report.repaired = repair && !report.is_consistent();

        Ok(report)
    }
}
