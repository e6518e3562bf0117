//! Module: collection::write
//! Responsibility: the mutation paths: insert, update, delete,
//! read-or-create.
//! Invariant: every uniqueness check precedes the first write of the
//! operation (insert) or of the index it guards (update), so a surfaced
//! `Duplicate` leaves no partial state behind.

use crate::{
    codec::Codec,
    collection::{Collection, CollectionError},
    error::Error,
    key::Key,
    obs::{self, MetricsEvent},
};

impl<C: Codec> Collection<C> {
    /// Insert a brand-new object; fails with `Duplicate` when the primary
    /// key or any unique secondary key is already taken.
    pub fn insert(&self, data: &C::Item) -> Result<Key, Error> {
        let indices = self.codec.indices();
        let primary = self.primary_index();
        let pk = primary.key(data);
        let Some(pk_bytes) = pk.as_bytes().map(<[u8]>::to_vec) else {
            return Err(CollectionError::SentinelIndexKey {
                index: primary.name().to_string(),
            }
            .into());
        };

        let primary_map = self.primary_map()?;
        if primary_map.contains_key(&pk_bytes)? {
            return Err(self.duplicate(primary.name()));
        }

        // Preflight every unique secondary before the first write; the
        // stored keys computed here are reused for the writes below.
        let mut secondary_puts = Vec::with_capacity(indices.len().saturating_sub(1));
        for index in &indices[1..] {
            let map = self.ordered_map(index)?;
            let stored = self.stored_key(index, data, &pk_bytes)?;
            if index.unique() && map.contains_key(&stored)? {
                return Err(self.duplicate(index.name()));
            }
            secondary_puts.push((map, stored));
        }

        let row = self.codec.encode(data, &pk)?;
        primary_map.put(&pk_bytes, &row)?;
        for (map, stored) in secondary_puts {
            map.put(&stored, &pk_bytes)?;
        }
        for index in self.codec.spatial_indices() {
            let map = self.spatial_map(index)?;
            map.insert(index.key(data), &pk_bytes)?;
        }

        self.debug_log(|| format!("insert {pk}"));
        obs::record(MetricsEvent::Insert {
            collection: self.name(),
        });

        Ok(pk)
    }

    /// Update the object stored under its primary key, inserting when it is
    /// absent. Index entries whose derived key changed are replaced;
    /// unchanged entries are left untouched.
    pub fn update(&self, data: &C::Item) -> Result<Key, Error> {
        let indices = self.codec.indices();
        let primary = self.primary_index();
        let pk = primary.key(data);
        let Some(pk_bytes) = pk.as_bytes().map(<[u8]>::to_vec) else {
            return Err(CollectionError::SentinelIndexKey {
                index: primary.name().to_string(),
            }
            .into());
        };

        let primary_map = self.primary_map()?;
        let Some(old_row) = primary_map.get(&pk_bytes)? else {
            return self.insert(data);
        };

        // Decode the previous image once, and only when a derived map can
        // actually change. Conflicting unique keys are detected across the
        // whole plan before the first write, so a surfaced `Duplicate`
        // leaves every map untouched.
        let mut moves = Vec::new();
        let old = if indices.len() > 1 || !self.codec.spatial_indices().is_empty() {
            // No primary key: the superseded image must not land in a
            // codec-side cache.
            let old = self.codec.decode(&old_row, None)?;

            for index in &indices[1..] {
                let map = self.ordered_map(index)?;
                let old_key = self.stored_key(index, &old, &pk_bytes)?;
                let new_key = self.stored_key(index, data, &pk_bytes)?;
                if old_key == new_key {
                    continue;
                }

                if index.unique()
                    && let Some(owner) = map.get(&new_key)?
                    && owner != pk_bytes
                {
                    return Err(self.duplicate(index.name()));
                }

                moves.push((map, old_key, new_key));
            }

            Some(old)
        } else {
            None
        };

        let row = self.codec.encode(data, &pk)?;
        primary_map.put(&pk_bytes, &row)?;

        for (map, old_key, new_key) in moves {
            map.remove(&old_key)?;
            map.put(&new_key, &pk_bytes)?;
        }

        if let Some(old) = &old {
            for index in self.codec.spatial_indices() {
                let old_rect = index.key(old);
                let new_rect = index.key(data);
                if old_rect != new_rect {
                    let map = self.spatial_map(index)?;
                    map.remove(&old_rect, &pk_bytes)?;
                    map.insert(new_rect, &pk_bytes)?;
                }
            }
        }

        self.debug_log(|| format!("update {pk}"));
        obs::record(MetricsEvent::Update {
            collection: self.name(),
        });

        Ok(pk)
    }

    /// Remove one object by primary key; a missing key is a no-op. Returns
    /// whether a row was removed.
    ///
    /// The stored image is decoded to regenerate every derived key; the
    /// derived entries go first and the primary entry last, so a dangling
    /// secondary entry can only ever point at a still-present row.
    pub fn delete(&self, key: &Key) -> Result<bool, Error> {
        let Some(pk_bytes) = key.as_bytes() else {
            return Ok(false);
        };

        let primary_map = self.primary_map()?;
        let Some(old_row) = primary_map.get(pk_bytes)? else {
            return Ok(false);
        };
        // No primary key: the removed image must not land in a codec-side
        // cache.
        let old = self.codec.decode(&old_row, None)?;

        for index in &self.codec.indices()[1..] {
            let map = self.ordered_map(index)?;
            let stored = self.stored_key(index, &old, pk_bytes)?;
            map.remove(&stored)?;
        }
        for index in self.codec.spatial_indices() {
            let map = self.spatial_map(index)?;
            map.remove(&index.key(&old), pk_bytes)?;
        }
        primary_map.remove(pk_bytes)?;

        self.debug_log(|| format!("delete {key}"));
        obs::record(MetricsEvent::Delete {
            collection: self.name(),
        });

        Ok(true)
    }

    /// Read the object under `key`, inserting and returning the supplied
    /// default when absent. The default's own primary key is not checked
    /// against `key`.
    pub fn read_or_create(
        &self,
        key: &Key,
        default: impl FnOnce() -> C::Item,
    ) -> Result<C::Item, Error> {
        if let Some(found) = self.read(key)? {
            return Ok(found);
        }

        let item = default();
        self.insert(&item)?;

        Ok(item)
    }

    fn duplicate(&self, index: &str) -> Error {
        obs::record(MetricsEvent::UniqueViolation {
            collection: self.name(),
            index,
        });

        CollectionError::Duplicate {
            index: index.to_string(),
        }
        .into()
    }
}
