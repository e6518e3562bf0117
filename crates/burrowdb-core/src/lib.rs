//! Collection engine for burrowdb: the ordered byte-key contract, codec
//! seam, cross-index mutation paths, range-scan cursors, and the store
//! lifecycle over an injected ordered key-value engine.

pub mod codec;
pub mod collection;
pub mod cursor;
pub mod error;
pub mod key;
pub mod kv;
pub mod obs;
pub mod rect;
pub mod store;

mod counter;

///
/// Prelude
///
/// Prelude contains only domain vocabulary: the types an application names
/// when declaring codecs and running queries.
///

pub mod prelude {
    pub use crate::{
        codec::{Codec, IndexDef, SpatialIndexDef},
        collection::Collection,
        cursor::Scan,
        error::Error,
        key::{Key, KeyPart},
        rect::Rect,
        store::{Store, StoreConfig},
    };
}
