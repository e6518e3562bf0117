//! Module: store
//! Responsibility: the process-wide lifecycle: one backend, the collections
//! bound to it, and the commit/rollback/close surface.
//! Does not own: collection semantics or map contents.
//! Boundary: the only place a backend is chosen; everything downstream
//! works against the `kv` traits.

use crate::{
    codec::Codec,
    collection::Collection,
    error::Error,
    kv::{FileKv, KvBackend, MemoryKv},
};
use std::sync::Arc;
use thiserror::Error as ThisError;

///
/// StoreError
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("cannot close: {count} transaction(s) still open")]
    OpenTransactions { count: u64 },
}

///
/// StoreConfig
///
/// Builder-style engine configuration. An empty filename selects the
/// in-memory engine; anything else names the snapshot file of the bundled
/// file engine. Injected engines receive the whole config and interpret
/// the options their own way.
///

#[derive(Clone, Debug)]
pub struct StoreConfig {
    pub(crate) filename: String,
    pub(crate) compressed: bool,
    pub(crate) read_cache_mb: u32,
    pub(crate) autocommit_buffer_kb: u32,
    pub(crate) autocommit_delay_ms: u64,
    pub(crate) encryption_key: String,
}

impl StoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            filename: String::new(),
            compressed: false,
            read_cache_mb: 16,
            autocommit_buffer_kb: 1024,
            autocommit_delay_ms: 1000,
            encryption_key: String::new(),
        }
    }

    /// Path of the backing file; empty means in-memory.
    #[must_use]
    pub fn filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    /// Compress persisted pages.
    #[must_use]
    pub const fn compressed(mut self, compressed: bool) -> Self {
        self.compressed = compressed;
        self
    }

    /// Read-cache size in MiB; advisory for the bundled engines.
    #[must_use]
    pub const fn read_cache_mb(mut self, read_cache_mb: u32) -> Self {
        self.read_cache_mb = read_cache_mb;
        self
    }

    /// Write-buffer high-water mark, in KiB, that triggers autocommit.
    #[must_use]
    pub const fn autocommit_buffer_kb(mut self, autocommit_buffer_kb: u32) -> Self {
        self.autocommit_buffer_kb = autocommit_buffer_kb;
        self
    }

    /// Maximum dwell before autocommit, in milliseconds.
    #[must_use]
    pub const fn autocommit_delay_ms(mut self, autocommit_delay_ms: u64) -> Self {
        self.autocommit_delay_ms = autocommit_delay_ms;
        self
    }

    /// Encrypt persisted pages with this key; empty disables encryption.
    #[must_use]
    pub fn encryption_key(mut self, encryption_key: impl Into<String>) -> Self {
        self.encryption_key = encryption_key.into();
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}

///
/// Store
///
/// Owns the KV backend for its whole lifetime. Collections created through
/// a store share that lifetime; cursors borrow maps from it and must not
/// outlive a close.
///

pub struct Store {
    backend: Arc<dyn KvBackend>,
}

impl Store {
    /// Open a store with one of the bundled engines, chosen by the config.
    pub fn open(config: &StoreConfig) -> Result<Self, Error> {
        let backend: Arc<dyn KvBackend> = if config.filename.is_empty() {
            Arc::new(MemoryKv::new())
        } else {
            Arc::new(FileKv::open(config)?)
        };

        Ok(Self { backend })
    }

    /// Open an in-memory store with default options.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            backend: Arc::new(MemoryKv::new()),
        }
    }

    /// Run against an injected engine.
    #[must_use]
    pub fn with_backend(backend: Arc<dyn KvBackend>) -> Self {
        Self { backend }
    }

    /// Open (or create) a collection. The codec's index set must match
    /// whatever was used to write the collection before; no metadata is
    /// kept to check it.
    pub fn collection<C: Codec>(&self, name: &str, codec: C) -> Result<Collection<C>, Error> {
        Collection::open(Arc::clone(&self.backend), name, codec)
    }

    /// Flush state and return the new durable version.
    pub fn commit(&self) -> Result<u64, Error> {
        Ok(self.backend.commit()?)
    }

    /// Revert the backend to a previously committed version.
    pub fn rollback_to(&self, version: u64) -> Result<(), Error> {
        Ok(self.backend.rollback_to(version)?)
    }

    /// Drop a backing map by name.
    pub fn delete_map(&self, name: &str) -> Result<(), Error> {
        Ok(self.backend.delete_map(name)?)
    }

    /// Names of the collections with backing state: primary maps are the
    /// map names without a `'.'`.
    pub fn list_collections(&self) -> Result<Vec<String>, Error> {
        let names = self.backend.map_names()?;

        Ok(names
            .into_iter()
            .filter(|name| !name.contains('.'))
            .collect())
    }

    pub fn set_autocommit_delay_ms(&self, ms: u64) {
        self.backend.set_autocommit_delay_ms(ms);
    }

    /// Close the backend. Fails while long-running transactions are open;
    /// the caller must ensure no live cursors remain.
    pub fn close(self) -> Result<(), Error> {
        let count = self.backend.open_transactions();
        if count > 0 {
            return Err(StoreError::OpenTransactions { count }.into());
        }
        Ok(self.backend.close()?)
    }
}

///
/// TESTS
///
