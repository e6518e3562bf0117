//! Module: error
//! Responsibility: the public error surface.
//! Each module owns its own failure enum; this type is their sum, so a
//! caller can match one level deep for the kind it cares about.

use crate::{
    codec::CodecError, collection::CollectionError, cursor::CursorError, kv::BackendError,
    store::StoreError,
};
use thiserror::Error as ThisError;

///
/// Error
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Collection(#[from] CollectionError),

    #[error(transparent)]
    Cursor(#[from] CursorError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl Error {
    /// A uniqueness violation on insert or update.
    #[must_use]
    pub const fn is_duplicate(&self) -> bool {
        matches!(self, Self::Collection(CollectionError::Duplicate { .. }))
    }

    /// A query, delete, or count named an index that does not exist.
    #[must_use]
    pub const fn is_unknown_index(&self) -> bool {
        matches!(self, Self::Collection(CollectionError::UnknownIndex { .. }))
    }
}
