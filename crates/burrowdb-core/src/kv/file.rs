//! Module: kv::file
//! Responsibility: the bundled snapshot-file engine.
//! Boundary: reuses the in-memory maps for all ordered-map semantics and
//! persists their exported state as one framed snapshot per commit.
//!
//! Snapshot framing: `BRW1` magic, one flags byte (bit 0 gzip, bit 1
//! AES-256-GCM with a random 12-byte nonce prepended), then the payload.
//! Writes go to a sibling temp file and are renamed into place.

use crate::{
    kv::{
        BackendError, KvBackend, KvMap, SpatialMap,
        memory::{MemoryKv, StoreState},
    },
    rect::Rect,
    store::StoreConfig,
};
use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{
    io::{Read, Write},
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

const MAGIC: &[u8; 4] = b"BRW1";
const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_ENCRYPTED: u8 = 0b0000_0010;
const NONCE_LEN: usize = 12;

#[derive(Deserialize, Serialize)]
struct Snapshot {
    version: u64,
    state: StoreState,
}

///
/// FileKv
///
/// Ordered-map engine with whole-store durability: map semantics come from
/// [`MemoryKv`]; every commit serializes the exported state to the snapshot
/// file. Mutations count toward a dirty-byte high-water mark that triggers
/// autocommit when the configured write buffer fills.
///

#[derive(Clone)]
pub struct FileKv {
    mem: MemoryKv,
    shared: Arc<FileShared>,
}

struct FileShared {
    path: PathBuf,
    compressed: bool,
    cipher_key: Option<[u8; 32]>,
    autocommit_buffer_bytes: u64,
    autocommit_delay_ms: AtomicU64,
    dirty_bytes: AtomicU64,
    io: Mutex<()>,
}

impl FileKv {
    /// Open (or create) the snapshot file named by the config.
    pub fn open(config: &StoreConfig) -> Result<Self, BackendError> {
        let path = PathBuf::from(&config.filename);
        let cipher_key = if config.encryption_key.is_empty() {
            None
        } else {
            Some(Sha256::digest(config.encryption_key.as_bytes()).into())
        };

        let backend = Self {
            mem: MemoryKv::new(),
            shared: Arc::new(FileShared {
                path,
                compressed: config.compressed,
                cipher_key,
                autocommit_buffer_bytes: u64::from(config.autocommit_buffer_kb) * 1024,
                autocommit_delay_ms: AtomicU64::new(config.autocommit_delay_ms),
                dirty_bytes: AtomicU64::new(0),
                io: Mutex::new(()),
            }),
        };

        if backend.shared.path.exists() {
            let snapshot = backend.read_snapshot()?;
            backend.mem.restore(snapshot.version, snapshot.state);
        }

        Ok(backend)
    }

    fn read_snapshot(&self) -> Result<Snapshot, BackendError> {
        let raw = std::fs::read(&self.shared.path)?;
        if raw.len() < MAGIC.len() + 1 || &raw[..MAGIC.len()] != MAGIC {
            return Err(BackendError::Corrupt("bad snapshot header".to_string()));
        }
        let flags = raw[MAGIC.len()];
        let mut payload = raw[MAGIC.len() + 1..].to_vec();

        if flags & FLAG_ENCRYPTED != 0 {
            let Some(key) = &self.shared.cipher_key else {
                return Err(BackendError::Corrupt(
                    "snapshot is encrypted and no key was configured".to_string(),
                ));
            };
            if payload.len() < NONCE_LEN {
                return Err(BackendError::Corrupt("snapshot truncated".to_string()));
            }
            let cipher = Aes256Gcm::new(key.into());
            let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
            payload = cipher
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|_| {
                    BackendError::Corrupt("snapshot decryption failed".to_string())
                })?;
        } else if self.shared.cipher_key.is_some() {
            return Err(BackendError::Corrupt(
                "a key was configured but the snapshot is not encrypted".to_string(),
            ));
        }

        if flags & FLAG_COMPRESSED != 0 {
            let mut decoder = GzDecoder::new(payload.as_slice());
            let mut out = Vec::new();
            decoder.read_to_end(&mut out)?;
            payload = out;
        }

        serde_cbor::from_slice(&payload)
            .map_err(|err| BackendError::Corrupt(format!("snapshot decode failed: {err}")))
    }

    fn write_snapshot(&self, snapshot: &Snapshot) -> Result<(), BackendError> {
        let mut payload = serde_cbor::to_vec(snapshot)
            .map_err(|err| BackendError::Io(format!("snapshot encode failed: {err}")))?;
        let mut flags = 0u8;

        if self.shared.compressed {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(&payload)?;
            payload = encoder.finish()?;
            flags |= FLAG_COMPRESSED;
        }

        if let Some(key) = &self.shared.cipher_key {
            let cipher = Aes256Gcm::new(key.into());
            let mut nonce = [0u8; NONCE_LEN];
            OsRng.fill_bytes(&mut nonce);
            let ciphertext = cipher
                .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
                .map_err(|_| BackendError::Io("snapshot encryption failed".to_string()))?;
            payload = nonce.to_vec();
            payload.extend_from_slice(&ciphertext);
            flags |= FLAG_ENCRYPTED;
        }

        let mut framed = Vec::with_capacity(MAGIC.len() + 1 + payload.len());
        framed.extend_from_slice(MAGIC);
        framed.push(flags);
        framed.extend_from_slice(&payload);

        let tmp = self.shared.path.with_extension("tmp");
        std::fs::write(&tmp, &framed)?;
        std::fs::rename(&tmp, &self.shared.path)?;

        Ok(())
    }

    fn persist(&self, version: u64) -> Result<(), BackendError> {
        let _guard = self.shared.io.lock();
        let snapshot = Snapshot {
            version,
            state: self.mem.export_state(),
        };
        self.write_snapshot(&snapshot)?;
        self.shared.dirty_bytes.store(0, Ordering::Release);

        Ok(())
    }

    /// Account freshly written bytes and autocommit past the high-water mark.
    fn note_dirty(&self, bytes: u64) -> Result<(), BackendError> {
        let buffer = self.shared.autocommit_buffer_bytes;
        let dirty = self
            .shared
            .dirty_bytes
            .fetch_add(bytes, Ordering::AcqRel)
            .saturating_add(bytes);
        if buffer > 0 && dirty >= buffer {
            self.commit()?;
        }

        Ok(())
    }
}

impl KvBackend for FileKv {
    fn open_map(&self, name: &str) -> Result<Arc<dyn KvMap>, BackendError> {
        let inner = self.mem.open_map(name)?;

        Ok(Arc::new(FileMap {
            inner,
            backend: self.clone(),
        }))
    }

    fn open_spatial_map(&self, name: &str) -> Result<Arc<dyn SpatialMap>, BackendError> {
        let inner = self.mem.open_spatial_map(name)?;

        Ok(Arc::new(FileSpatialMap {
            inner,
            backend: self.clone(),
        }))
    }

    fn delete_map(&self, name: &str) -> Result<(), BackendError> {
        self.mem.delete_map(name)?;
        self.note_dirty(1)
    }

    fn map_names(&self) -> Result<Vec<String>, BackendError> {
        self.mem.map_names()
    }

    fn commit(&self) -> Result<u64, BackendError> {
        let version = self.mem.commit()?;
        self.persist(version)?;

        Ok(version)
    }

    fn rollback_to(&self, version: u64) -> Result<(), BackendError> {
        self.mem.rollback_to(version)?;
        self.persist(version)
    }

    fn set_autocommit_delay_ms(&self, ms: u64) {
        self.shared.autocommit_delay_ms.store(ms, Ordering::Release);
    }

    fn close(&self) -> Result<(), BackendError> {
        if self.mem.is_closed() {
            return Ok(());
        }
        let version = self.mem.commit()?;
        self.persist(version)?;
        self.mem.mark_closed();

        Ok(())
    }
}

///
/// FileMap
///
/// Ordered-map handle that funnels mutations through dirty accounting.
///

struct FileMap {
    inner: Arc<dyn KvMap>,
    backend: FileKv,
}

impl KvMap for FileMap {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let previous = self.inner.put(key, value)?;
        self.backend.note_dirty((key.len() + value.len()) as u64)?;

        Ok(previous)
    }

    fn remove(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        let previous = self.inner.remove(key)?;
        if previous.is_some() {
            self.backend.note_dirty(key.len() as u64)?;
        }

        Ok(previous)
    }

    fn contains_key(&self, key: &[u8]) -> Result<bool, BackendError> {
        self.inner.contains_key(key)
    }

    fn len(&self) -> Result<u64, BackendError> {
        self.inner.len()
    }

    fn first_key(&self) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.first_key()
    }

    fn last_key(&self) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.last_key()
    }

    fn ceiling_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.ceiling_key(key)
    }

    fn floor_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.floor_key(key)
    }

    fn higher_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.higher_key(key)
    }

    fn lower_key(&self, key: &[u8]) -> Result<Option<Vec<u8>>, BackendError> {
        self.inner.lower_key(key)
    }
}

struct FileSpatialMap {
    inner: Arc<dyn SpatialMap>,
    backend: FileKv,
}

impl SpatialMap for FileSpatialMap {
    fn insert(&self, rect: Rect, value: &[u8]) -> Result<(), BackendError> {
        self.inner.insert(rect, value)?;
        self.backend
            .note_dirty((size_of::<Rect>() + value.len()) as u64)
    }

    fn remove(&self, rect: &Rect, value: &[u8]) -> Result<bool, BackendError> {
        let removed = self.inner.remove(rect, value)?;
        if removed {
            self.backend.note_dirty(size_of::<Rect>() as u64)?;
        }

        Ok(removed)
    }

    fn contained_by(&self, outer: &Rect) -> Result<Vec<(Rect, Vec<u8>)>, BackendError> {
        self.inner.contained_by(outer)
    }

    fn len(&self) -> Result<u64, BackendError> {
        self.inner.len()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn config_for(dir: &tempfile::TempDir) -> StoreConfig {
        StoreConfig::new().filename(dir.path().join("store.brw").to_string_lossy())
    }

    #[test]
    fn snapshot_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir);

        let backend = FileKv::open(&config).unwrap();
        let map = backend.open_map("m").unwrap();
        map.put(b"k", b"v").unwrap();
        let spatial = backend.open_spatial_map("s").unwrap();
        spatial.insert(Rect::point(1.0, 2.0), b"pk").unwrap();
        backend.close().unwrap();

        let reopened = FileKv::open(&config).unwrap();
        let map = reopened.open_map("m").unwrap();
        assert_eq!(map.get(b"k").unwrap().as_deref(), Some(b"v".as_slice()));
        let spatial = reopened.open_spatial_map("s").unwrap();
        assert_eq!(spatial.len().unwrap(), 1);

        // Versions committed after the reopen are rollback targets.
        let version = reopened.commit().unwrap();
        map.put(b"k2", b"v2").unwrap();
        reopened.rollback_to(version).unwrap();
        assert!(!map.contains_key(b"k2").unwrap());
    }

    #[test]
    fn compressed_and_encrypted_snapshots_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir).compressed(true).encryption_key("sesame");

        let backend = FileKv::open(&config).unwrap();
        backend.open_map("m").unwrap().put(b"k", b"v").unwrap();
        backend.close().unwrap();

        let reopened = FileKv::open(&config).unwrap();
        let map = reopened.open_map("m").unwrap();
        assert_eq!(map.get(b"k").unwrap().as_deref(), Some(b"v".as_slice()));
    }

    #[test]
    fn wrong_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir).encryption_key("right");

        FileKv::open(&config).unwrap().close().unwrap();

        let wrong = config_for(&dir).encryption_key("wrong");
        assert!(matches!(
            FileKv::open(&wrong),
            Err(BackendError::Corrupt(_))
        ));

        let missing = config_for(&dir);
        assert!(matches!(
            FileKv::open(&missing),
            Err(BackendError::Corrupt(_))
        ));
    }

    #[test]
    fn autocommit_persists_once_the_buffer_fills() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_for(&dir).autocommit_buffer_kb(1);

        let backend = FileKv::open(&config).unwrap();
        let map = backend.open_map("m").unwrap();
        let value = vec![0xAB; 2048];
        map.put(b"big", &value).unwrap();

        // Reopen without an explicit commit; the autocommit must have run.
        let reopened = FileKv::open(&config).unwrap();
        let map = reopened.open_map("m").unwrap();
        assert_eq!(map.get(b"big").unwrap(), Some(value));
    }
}
