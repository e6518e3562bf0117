//! # burrowdb
//!
//! Embedded document store layered over an ordered key-value engine.
//! Collections map user objects into a primary byte-keyed map and keep any
//! number of ordered secondary and spatial maps consistent with it; a
//! client-supplied [`Codec`] owns serialization and index-key derivation.
//!
//! ## Quick start
//!
//! ```ignore
//! use burrowdb::prelude::*;
//!
//! let store = Store::in_memory();
//! let people = store.collection("people", PersonCodec::new())?;
//!
//! people.insert(&alice)?;
//! let mut cursor = people.query_index("by_name", Scan::all().count(10))?;
//! while let Some(person) = cursor.next_entry()? {
//!     println!("{}", person.name);
//! }
//! ```
//!
//! The engine behind a store is pluggable: `Store::open` picks one of the
//! bundled engines from a [`StoreConfig`], and `Store::with_backend`
//! accepts any implementation of the `kv` traits.

pub mod stream;

mod macros;

pub use burrowdb_core::{
    codec::{Codec, CodecError, IndexDef, SpatialIndexDef},
    collection::{Collection, CollectionError, DeleteCursor, IntegrityReport},
    cursor::{Cursor, CursorError, Scan},
    error::Error,
    key::{Key, KeyPart},
    kv,
    obs::{MetricsEvent, MetricsSink, with_metrics_sink},
    rect::Rect,
    store::{Store, StoreConfig, StoreError},
};

///
/// Prelude
///

pub mod prelude {
    pub use crate::{
        Codec, Collection, Cursor, Error, IndexDef, Key, KeyPart, Rect, Scan, SpatialIndexDef,
        Store, StoreConfig, key,
    };
}
