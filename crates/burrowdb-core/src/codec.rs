//! Module: codec
//! Responsibility: the client contract for serialization and index-key
//! derivation.
//! Does not own: index maintenance, uniqueness policy, or storage.
//! Boundary: collections call into a codec; the engine never interprets
//! the row bytes a codec produces.

use crate::{key::Key, rect::Rect};
use thiserror::Error as ThisError;

///
/// CodecError
///

#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("encode failed: {0}")]
    Encode(String),

    #[error("decode failed: {0}")]
    Decode(String),
}

///
/// Codec
///
/// Client-supplied serializer and key generator for one collection.
///
/// The `primary_key` passed to `encode`/`decode` is advisory: it lets a
/// codec key objects by primary key for its own cache. A `None` primary key
/// in `decode` means the result must not populate such a cache. The engine
/// itself never caches decoded objects.
///

pub trait Codec: Send + Sync + 'static {
    type Item;

    fn encode(&self, data: &Self::Item, primary_key: &Key) -> Result<Vec<u8>, CodecError>;

    fn decode(&self, bytes: &[u8], primary_key: Option<&Key>) -> Result<Self::Item, CodecError>;

    /// Ordered index declarations. The first entry is the primary index and
    /// must be unique; at least one entry is required.
    fn indices(&self) -> &[IndexDef<Self::Item>];

    /// Spatial index declarations; empty by default.
    fn spatial_indices(&self) -> &[SpatialIndexDef<Self::Item>] {
        &[]
    }
}

///
/// IndexDef
///
/// One named ordered index: a uniqueness flag and a key generator.
///

pub struct IndexDef<T> {
    name: String,
    unique: bool,
    key_gen: Box<dyn Fn(&T) -> Key + Send + Sync>,
}

impl<T> IndexDef<T> {
    pub fn new(
        name: impl Into<String>,
        unique: bool,
        key_gen: impl Fn(&T) -> Key + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            unique,
            key_gen: Box::new(key_gen),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub const fn unique(&self) -> bool {
        self.unique
    }

    /// Derive the logical index key for one object.
    #[must_use]
    pub fn key(&self, data: &T) -> Key {
        (self.key_gen)(data)
    }
}

impl<T> std::fmt::Debug for IndexDef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexDef")
            .field("name", &self.name)
            .field("unique", &self.unique)
            .finish_non_exhaustive()
    }
}

///
/// SpatialIndexDef
///
/// One named spatial index: a rectangle generator.
///

pub struct SpatialIndexDef<T> {
    name: String,
    key_gen: Box<dyn Fn(&T) -> Rect + Send + Sync>,
}

impl<T> SpatialIndexDef<T> {
    pub fn new(
        name: impl Into<String>,
        key_gen: impl Fn(&T) -> Rect + Send + Sync + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            key_gen: Box::new(key_gen),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn key(&self, data: &T) -> Rect {
        (self.key_gen)(data)
    }
}

impl<T> std::fmt::Debug for SpatialIndexDef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialIndexDef")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
