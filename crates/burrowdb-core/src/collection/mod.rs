//! Module: collection
//! Responsibility: one named collection: a primary data map, its ordered
//! secondary maps, and its spatial maps, kept consistent across every
//! mutation.
//! Does not own: serialization or key derivation (the codec's job) or map
//! storage (the backend's job).
//! Boundary: constructed by the store; all validation happens before the
//! first backend write.

mod verify;
mod write;


pub use verify::IntegrityReport;

use crate::{
    codec::{Codec, IndexDef, SpatialIndexDef},
    counter,
    cursor::{Cursor, Scan},
    error::Error,
    key::Key,
    kv::{KvBackend, KvMap, SpatialMap},
    obs::{self, MetricsEvent},
    rect::Rect,
};
use parking_lot::RwLock;
use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};
use thiserror::Error as ThisError;

///
/// CollectionError
///

#[derive(Debug, ThisError)]
pub enum CollectionError {
    #[error("collection name must not contain '.': {name}")]
    BadName { name: String },

    #[error("codec declares no ordered indices")]
    NoIndex,

    #[error("primary index '{index}' must be unique")]
    NonUniquePrimary { index: String },

    #[error("duplicate index name: {name}")]
    DuplicateIndexName { name: String },

    #[error("duplicate key on unique index '{index}'")]
    Duplicate { index: String },

    #[error("unknown index: {name}")]
    UnknownIndex { name: String },

    #[error("index '{index}' generated a sentinel key")]
    SentinelIndexKey { index: String },
}

///
/// Collection
///
/// Handle to one collection. Backing maps open lazily on first reference
/// and are cached per name; the cache is concurrency-safe, so a collection
/// may be shared across threads.
///
/// Map naming: the primary map carries the collection name; each secondary
/// and spatial map is named `<collection>.<index>`.
///

pub struct Collection<C: Codec> {
    name: Arc<str>,
    codec: Arc<C>,
    backend: Arc<dyn KvBackend>,
    maps: RwLock<HashMap<String, Arc<dyn KvMap>>>,
    spatial: RwLock<HashMap<String, Arc<dyn SpatialMap>>>,
    debug: bool,
}

impl<C: Codec> std::fmt::Debug for Collection<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<C: Codec> Collection<C> {
    pub(crate) fn open(
        backend: Arc<dyn KvBackend>,
        name: &str,
        codec: C,
    ) -> Result<Self, Error> {
        if name.contains('.') {
            return Err(CollectionError::BadName {
                name: name.to_string(),
            }
            .into());
        }

        let Some(primary) = codec.indices().first() else {
            return Err(CollectionError::NoIndex.into());
        };
        if !primary.unique() {
            return Err(CollectionError::NonUniquePrimary {
                index: primary.name().to_string(),
            }
            .into());
        }

        let mut seen = BTreeSet::new();
        let ordered_names = codec.indices().iter().map(IndexDef::name);
        let spatial_names = codec.spatial_indices().iter().map(SpatialIndexDef::name);
        for index_name in ordered_names.chain(spatial_names) {
            if !seen.insert(index_name) {
                return Err(CollectionError::DuplicateIndexName {
                    name: index_name.to_string(),
                }
                .into());
            }
        }

        Ok(Self {
            name: Arc::from(name),
            codec: Arc::new(codec),
            backend,
            maps: RwLock::new(HashMap::new()),
            spatial: RwLock::new(HashMap::new()),
            debug: false,
        })
    }

    /// Enable verbose logging of every mutation on this handle.
    #[must_use]
    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    // ---------------------------------------------------------------------
    // Index and map resolution
    // ---------------------------------------------------------------------

    pub(crate) fn primary_index(&self) -> &IndexDef<C::Item> {
        // Construction guarantees at least one ordered index.
        &self.codec.indices()[0]
    }

    fn ordered_index(&self, name: &str) -> Result<&IndexDef<C::Item>, Error> {
        self.codec
            .indices()
            .iter()
            .find(|index| index.name() == name)
            .ok_or_else(|| {
                CollectionError::UnknownIndex {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn spatial_index(&self, name: &str) -> Result<&SpatialIndexDef<C::Item>, Error> {
        self.codec
            .spatial_indices()
            .iter()
            .find(|index| index.name() == name)
            .ok_or_else(|| {
                CollectionError::UnknownIndex {
                    name: name.to_string(),
                }
                .into()
            })
    }

    fn is_primary(&self, index: &IndexDef<C::Item>) -> bool {
        index.name() == self.primary_index().name()
    }

    fn backing_map_name(&self, index: &IndexDef<C::Item>) -> String {
        if self.is_primary(index) {
            self.name.to_string()
        } else {
            format!("{}.{}", self.name, index.name())
        }
    }

    pub(crate) fn primary_map(&self) -> Result<Arc<dyn KvMap>, Error> {
        self.ordered_map(self.primary_index())
    }

    pub(crate) fn ordered_map(
        &self,
        index: &IndexDef<C::Item>,
    ) -> Result<Arc<dyn KvMap>, Error> {
        let map_name = self.backing_map_name(index);
        if let Some(map) = self.maps.read().get(&map_name) {
            return Ok(Arc::clone(map));
        }

        let mut maps = self.maps.write();
        if let Some(map) = maps.get(&map_name) {
            return Ok(Arc::clone(map));
        }
        let map = self.backend.open_map(&map_name)?;
        maps.insert(map_name, Arc::clone(&map));

        Ok(map)
    }

    pub(crate) fn spatial_map(
        &self,
        index: &SpatialIndexDef<C::Item>,
    ) -> Result<Arc<dyn SpatialMap>, Error> {
        let map_name = format!("{}.{}", self.name, index.name());
        if let Some(map) = self.spatial.read().get(&map_name) {
            return Ok(Arc::clone(map));
        }

        let mut maps = self.spatial.write();
        if let Some(map) = maps.get(&map_name) {
            return Ok(Arc::clone(map));
        }
        let map = self.backend.open_spatial_map(&map_name)?;
        maps.insert(map_name, Arc::clone(&map));

        Ok(map)
    }

    /// Physical key under which `data` is indexed by `index`: the bare
    /// logical key for unique indices, suffixed by the primary key bytes
    /// otherwise.
    pub(crate) fn stored_key(
        &self,
        index: &IndexDef<C::Item>,
        data: &C::Item,
        pk_bytes: &[u8],
    ) -> Result<Vec<u8>, Error> {
        let key = index.key(data);
        let Some(bytes) = key.as_bytes() else {
            return Err(CollectionError::SentinelIndexKey {
                index: index.name().to_string(),
            }
            .into());
        };

        let mut stored = bytes.to_vec();
        if !index.unique() {
            stored.extend_from_slice(pk_bytes);
        }

        Ok(stored)
    }

    // ---------------------------------------------------------------------
    // Read paths
    // ---------------------------------------------------------------------

    pub fn read(&self, key: &Key) -> Result<Option<C::Item>, Error> {
        let Some(bytes) = key.as_bytes() else {
            return Ok(None);
        };
        match self.primary_map()?.get(bytes)? {
            Some(row) => Ok(Some(self.codec.decode(&row, Some(key))?)),
            None => Ok(None),
        }
    }

    pub fn contains(&self, key: &Key) -> Result<bool, Error> {
        match key.as_bytes() {
            Some(bytes) => Ok(self.primary_map()?.contains_key(bytes)?),
            None => Ok(false),
        }
    }

    /// Entries in the primary map.
    pub fn len(&self) -> Result<u64, Error> {
        Ok(self.primary_map()?.len()?)
    }

    pub fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len()? == 0)
    }

    /// Count primary entries between the bounds, both inclusive.
    pub fn count(&self, lower: &Key, upper: &Key) -> Result<u64, Error> {
        self.count_on(self.primary_index(), lower, upper)
    }

    /// Count entries of a named index between the bounds, both inclusive.
    pub fn count_index(&self, index: &str, lower: &Key, upper: &Key) -> Result<u64, Error> {
        self.count_on(self.ordered_index(index)?, lower, upper)
    }

    fn count_on(
        &self,
        index: &IndexDef<C::Item>,
        lower: &Key,
        upper: &Key,
    ) -> Result<u64, Error> {
        let map = self.ordered_map(index)?;
        let rows = counter::count_range(map.as_ref(), lower, upper)?;
        obs::record(MetricsEvent::RowsScanned {
            collection: &self.name,
            rows,
        });

        Ok(rows)
    }

    // ---------------------------------------------------------------------
    // Scans
    // ---------------------------------------------------------------------

    /// Scan the primary index.
    pub fn query(&self, scan: Scan) -> Result<Cursor<C>, Error> {
        self.cursor_on(self.primary_index(), scan)
    }

    /// Scan a named ordered index.
    pub fn query_index(&self, index: &str, scan: Scan) -> Result<Cursor<C>, Error> {
        self.cursor_on(self.ordered_index(index)?, scan)
    }

    fn cursor_on(&self, index: &IndexDef<C::Item>, scan: Scan) -> Result<Cursor<C>, Error> {
        let scan_map = self.ordered_map(index)?;
        let primary_map = if self.is_primary(index) {
            None
        } else {
            Some(self.primary_map()?)
        };

        Cursor::new(
            Arc::clone(&self.name),
            Arc::clone(&self.codec),
            scan_map,
            primary_map,
            scan,
        )
    }

    /// Scan the primary index, deleting each element before it is yielded.
    pub fn delete_range(&self, scan: Scan) -> Result<DeleteCursor<'_, C>, Error> {
        Ok(DeleteCursor {
            collection: self,
            cursor: self.query(scan)?,
        })
    }

    /// Scan a named index, deleting each element before it is yielded.
    pub fn delete_range_index(
        &self,
        index: &str,
        scan: Scan,
    ) -> Result<DeleteCursor<'_, C>, Error> {
        Ok(DeleteCursor {
            collection: self,
            cursor: self.query_index(index, scan)?,
        })
    }

    /// Rectangles of a spatial index wholly contained by `outer`.
    pub fn contained_by(&self, index: &str, outer: &Rect) -> Result<Vec<Rect>, Error> {
        let map = self.spatial_map(self.spatial_index(index)?)?;
        let hits = map.contained_by(outer)?;

        Ok(hits.into_iter().map(|(rect, _)| rect).collect())
    }

    pub(crate) fn debug_log(&self, message: impl FnOnce() -> String) {
        if self.debug {
            println!("[{}] {}", self.name, message());
        }
    }
}

///
/// DeleteCursor
///
/// Bulk-delete scan: each produced element is removed from every map
/// before it is yielded, so abandoning the cursor leaves the remainder of
/// the range intact.
///

pub struct DeleteCursor<'a, C: Codec> {
    collection: &'a Collection<C>,
    cursor: Cursor<C>,
}

impl<C: Codec> DeleteCursor<'_, C> {
    pub fn next_entry(&mut self) -> Result<Option<C::Item>, Error> {
        match self.cursor.next_with_key()? {
            Some((pk, item)) => {
                self.collection.delete(&pk)?;
                Ok(Some(item))
            }
            None => Ok(None),
        }
    }
}

impl<C: Codec> Iterator for DeleteCursor<'_, C> {
    type Item = Result<C::Item, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}
