//! Module: kv::memory
//! Responsibility: the bundled in-memory engine behind the `kv` traits.
//! Boundary: also the state carrier for the snapshot-file engine, which
//! reuses these maps and persists their exported state.

use crate::{
    kv::{BackendError, KvBackend, KvMap, SpatialMap},
    rect::Rect,
};
use derive_more::Deref;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    ops::Bound,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

///
/// StoreState
///
/// Exported image of every map. Committed versions are retained as these
/// images; the file engine serializes one per snapshot.
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub(super) struct StoreState {
    pub(super) maps: BTreeMap<String, BTreeMap<Vec<u8>, Vec<u8>>>,
    pub(super) spatial: BTreeMap<String, Vec<(Rect, Vec<u8>)>>,
}

///
/// MemoryKv
///
/// In-memory ordered-map engine. Handles are cheap clones of one shared
/// state; maps open on first reference and survive rollback in place, so
/// cached `Arc` handles held by collections observe the restored contents.
///

#[derive(Clone, Default)]
pub struct MemoryKv {
    shared: Arc<Shared>,
}

#[derive(Default)]
struct Shared {
    maps: RwLock<BTreeMap<String, Arc<MemoryMap>>>,
    spatial: RwLock<BTreeMap<String, Arc<MemorySpatialMap>>>,
    snapshots: Mutex<BTreeMap<u64, StoreState>>,
    version: AtomicU64,
    closed: AtomicBool,
}

impl MemoryKv {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> Result<(), BackendError> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(BackendError::Closed);
        }

        Ok(())
    }

    pub(super) fn export_state(&self) -> StoreState {
        let maps = self
            .shared
            .maps
            .read()
            .iter()
            .map(|(name, map)| (name.clone(), map.read().clone()))
            .collect();
        let spatial = self
            .shared
            .spatial
            .read()
            .iter()
            .map(|(name, map)| (name.clone(), map.read().clone()))
            .collect();

        StoreState { maps, spatial }
    }

    /// Replace every map's contents in place from an exported image.
    pub(super) fn import_state(&self, state: StoreState) {
        let mut maps = self.shared.maps.write();
        maps.retain(|name, map| {
            let keep = state.maps.contains_key(name);
            if !keep {
                map.write().clear();
            }
            keep
        });
        for (name, entries) in state.maps {
            let map = maps.entry(name).or_default();
            *map.write() = entries;
        }
        drop(maps);

        let mut spatial = self.shared.spatial.write();
        spatial.retain(|name, map| {
            let keep = state.spatial.contains_key(name);
            if !keep {
                map.write().clear();
            }
            keep
        });
        for (name, entries) in state.spatial {
            let map = spatial.entry(name).or_default();
            *map.write() = entries;
        }
    }

    /// Adopt a persisted image as the current state and latest version.
    pub(super) fn restore(&self, version: u64, state: StoreState) {
        self.import_state(state.clone());
        self.shared.version.store(version, Ordering::Release);
        let mut snapshots = self.shared.snapshots.lock();
        snapshots.clear();
        snapshots.insert(version, state);
    }

    pub(super) fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::Acquire)
    }

    pub(super) fn mark_closed(&self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

impl KvBackend for MemoryKv {
    fn open_map(&self, name: &str) -> Result<Arc<dyn KvMap>, BackendError> {
        self.ensure_open()?;
        let mut maps = self.shared.maps.write();
        let map = maps.entry(name.to_string()).or_default();

        Ok(Arc::clone(map) as Arc<dyn KvMap>)
    }

    fn open_spatial_map(&self, name: &str) -> Result<Arc<dyn SpatialMap>, BackendError> {
        self.ensure_open()?;
        let mut maps = self.shared.spatial.write();
        let map = maps.entry(name.to_string()).or_default();

        Ok(Arc::clone(map) as Arc<dyn SpatialMap>)
    }

    fn delete_map(&self, name: &str) -> Result<(), BackendError> {
        self.ensure_open()?;

        // Clear before unregistering so stale handles observe emptiness
        // rather than the dropped contents.
        if let Some(map) = self.shared.maps.write().remove(name) {
            map.write().clear();
        }
        if let Some(map) = self.shared.spatial.write().remove(name) {
            map.write().clear();
        }

        Ok(())
    }

    fn map_names(&self) -> Result<Vec<String>, BackendError> {
        self.ensure_open()?;
        let mut names: Vec<String> = self.shared.maps.read().keys().cloned().collect();
        names.extend(self.shared.spatial.read().keys().cloned());
        names.sort();
        names.dedup();

        Ok(names)
    }

    fn commit(&self) -> Result<u64, BackendError> {
        self.ensure_open()?;
        let state = self.export_state();
        let version = self.shared.version.fetch_add(1, Ordering::AcqRel) + 1;
        self.shared.snapshots.lock().insert(version, state);

        Ok(version)
    }

    fn rollback_to(&self, version: u64) -> Result<(), BackendError> {
        self.ensure_open()?;
        let mut snapshots = self.shared.snapshots.lock();
        let Some(state) = snapshots.get(&version).cloned() else {
            return Err(BackendError::UnknownVersion { version });
        };
        snapshots.retain(|v, _| *v <= version);
        drop(snapshots);

        self.import_state(state);

        Ok(())
    }

    fn close(&self) -> Result<(), BackendError> {
        self.mark_closed();

        Ok(())
    }
}

///
/// MemoryMap
///
/// Thin wrapper over one ordered map behind a lock.
///

#[derive(Default, Deref)]
struct MemoryMap(RwLock<BTreeMap<Vec<u8>, Vec<u8>>>);

impl KvMap for MemoryMap {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.read().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.write().insert(key.to_vec(), value.to_vec()))
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.write().remove(key))
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool, BackendError> {
        Ok(self.read().contains_key(key))
    }

    fn len(&self) -> Result<u64, BackendError> {
        Ok(self.read().len() as u64)
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.read().keys().next().cloned())
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.read().keys().next_back().cloned())
    }

    fn ceiling_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .read()
            .range::<[u8], _>((Bound::Included(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn floor_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .read()
            .range::<[u8], _>((Bound::Unbounded, Bound::Included(key)))
            .next_back()
            .map(|(k, _)| k.clone()))
    }

    fn higher_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .read()
            .range::<[u8], _>((Bound::Excluded(key), Bound::Unbounded))
            .next()
            .map(|(k, _)| k.clone()))
    }

    fn lower_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self
            .read()
            .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(key)))
            .next_back()
            .map(|(k, _)| k.clone()))
    }
}

///
/// MemorySpatialMap
///
/// Linear-scan stand-in for the R-tree collaborator. Entry identity is the
/// `(rect, value)` pair; re-inserting an identical pair is a no-op.
///

#[derive(Default, Deref)]
struct MemorySpatialMap(RwLock<Vec<(Rect, Vec<u8>)>>);

impl SpatialMap for MemorySpatialMap {
    fn insert(&self, rect: Rect, value: &[u8]) -> Result<(), BackendError> {
        let mut entries = self.write();
        if !entries.iter().any(|(r, v)| *r == rect && v == value) {
            entries.push((rect, value.to_vec()));
        }

        Ok(())
    }

    fn remove(&self, rect: &Rect, value: &[u8]) -> Result<bool, BackendError> {
        let mut entries = self.write();
        let before = entries.len();
        entries.retain(|(r, v)| !(r == rect && v == value));

        Ok(entries.len() < before)
    }

    fn contained_by(&self, outer: &Rect) -> Result<Vec<(Rect, Vec<u8>)>, BackendError> {
        Ok(self
            .read()
            .iter()
            .filter(|(r, _)| outer.contains(r))
            .cloned()
            .collect())
    }

    fn len(&self) -> Result<u64, BackendError> {
        Ok(self.read().len() as u64)
    }
}

///
/// TESTS
///
