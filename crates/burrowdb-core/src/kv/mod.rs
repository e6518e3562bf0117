//! Module: kv
//! Responsibility: the trait seam between the collection engine and the
//! persistent ordered key-value collaborator.
//! Does not own: page formats, caching, compression, or durability policy;
//! those belong to the engine behind the traits.
//! Boundary: collections and cursors reach storage only through [`KvMap`],
//! [`SpatialMap`], and [`KvBackend`].

mod file;
mod memory;

pub use file::FileKv;
pub use memory::MemoryKv;

use crate::rect::Rect;
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// BackendError
///
/// Failures raised by the KV collaborator. The engine propagates these
/// opaquely and never retries.
///

#[derive(Debug, ThisError)]
pub enum BackendError {
    #[error("backend i/o failure: {0}")]
    Io(String),

    #[error("backend state corrupt: {0}")]
    Corrupt(String),

    #[error("no stored version {version}")]
    UnknownVersion { version: u64 },

    #[error("backend is closed")]
    Closed,

    #[error("backend does not support {0}")]
    Unsupported(&'static str),
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

///
/// KvMap
///
/// One named ordered map of bytes to bytes. Neighbor lookups operate on key
/// *values*, never on live iterator handles, so a caller may keep stepping
/// from a remembered key after the entry it names has been removed.
///

pub trait KvMap: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    fn contains_key(&self, key: &[u8]) -> Result<bool, BackendError>;
    fn len(&self) -> Result<u64, BackendError>;

    fn is_empty(&self) -> Result<bool, BackendError> {
        Ok(self.len()? == 0)
    }

    /// Smallest key in the map.
    fn first_key(&self) -> Result<Option<Vec<u8>>, BackendError>;
    /// Largest key in the map.
    fn last_key(&self) -> Result<Option<Vec<u8>>, BackendError>;
    /// Smallest key `>= key`.
    fn ceiling_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    /// Largest key `<= key`.
    fn floor_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    /// Smallest key `> key`.
    fn higher_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
    /// Largest key `< key`.
    fn lower_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError>;
}

///
/// SpatialMap
///
/// One named rectangle-keyed map, the R-tree-style collaborator. Entries
/// are `(rect, value)` pairs; equal rectangles may coexist under different
/// values.
///

pub trait SpatialMap: Send + Sync {
    fn insert(&self, rect: Rect, value: &[u8]) -> Result<(), BackendError>;

    /// Remove one `(rect, value)` entry; absent entries are a no-op.
    fn remove(&self, rect: &Rect, value: &[u8]) -> Result<bool, BackendError>;

    /// Rectangle keys wholly contained by `outer`, with their values.
    fn contained_by(&self, outer: &Rect) -> Result<Vec<(Rect, Vec<u8>)>, BackendError>;

    fn len(&self) -> Result<u64, BackendError>;
}

///
/// KvBackend
///
/// The persistent engine: a registry of named ordered and spatial maps plus
/// a commit/rollback/close lifecycle. Opening a map is idempotent and safe
/// under concurrency.
///

pub trait KvBackend: Send + Sync {
    fn open_map(&self, name: &str) -> Result<Arc<dyn KvMap>, BackendError>;
    fn open_spatial_map(&self, name: &str) -> Result<Arc<dyn SpatialMap>, BackendError>;

    /// Drop a map (ordered or spatial) by name. Unknown names are a no-op.
    fn delete_map(&self, name: &str) -> Result<(), BackendError>;

    /// Names of every registered map, ordered and spatial alike.
    fn map_names(&self) -> Result<Vec<String>, BackendError>;

    /// Flush state and return the new durable version.
    fn commit(&self) -> Result<u64, BackendError>;

    /// Revert every map to a previously committed version.
    fn rollback_to(&self, version: u64) -> Result<(), BackendError>;

    /// Long-running transactions currently open. The engine defines none;
    /// the hook is reserved for engines that do.
    fn open_transactions(&self) -> u64 {
        0
    }

    /// Runtime adjustment of the autocommit dwell; advisory for engines
    /// without one.
    fn set_autocommit_delay_ms(&self, _ms: u64) {}

    fn close(&self) -> Result<(), BackendError>;
}
