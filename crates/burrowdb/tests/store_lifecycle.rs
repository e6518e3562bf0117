//! Store lifecycle: engine selection, durability, rollback, and the
//! pull-stream adaptor.

use burrowdb::{
    Codec, CodecError, Collection, IndexDef, Key, KeyPart, Scan, Store, StoreConfig, key,
    stream::{CursorStream, StreamState},
};

struct NoteCodec {
    indices: Vec<IndexDef<(String, String)>>,
}

impl NoteCodec {
    fn new() -> Self {
        Self {
            indices: vec![
                IndexDef::new("id", true, |note: &(String, String)| {
                    Key::from(note.0.as_str())
                }),
                IndexDef::new("body", false, |note: &(String, String)| {
                    Key::from(note.1.as_str())
                }),
            ],
        }
    }
}

impl Codec for NoteCodec {
    type Item = (String, String);

    fn encode(&self, data: &Self::Item, _primary_key: &Key) -> Result<Vec<u8>, CodecError> {
        serde_cbor::to_vec(data).map_err(|err| CodecError::Encode(err.to_string()))
    }

    fn decode(&self, bytes: &[u8], _primary_key: Option<&Key>) -> Result<Self::Item, CodecError> {
        serde_cbor::from_slice(bytes).map_err(|err| CodecError::Decode(err.to_string()))
    }

    fn indices(&self) -> &[IndexDef<Self::Item>] {
        &self.indices
    }
}

fn note(id: &str, body: &str) -> (String, String) {
    (id.to_string(), body.to_string())
}

fn notes(store: &Store) -> Collection<NoteCodec> {
    store.collection("notes", NoteCodec::new()).unwrap()
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let config = StoreConfig::new()
        .filename(dir.path().join("notes.brw").to_string_lossy())
        .compressed(true);

    let store = Store::open(&config).unwrap();
    let col = notes(&store);
    col.insert(&note("n1", "first")).unwrap();
    col.insert(&note("n2", "second")).unwrap();
    store.commit().unwrap();
    store.close().unwrap();

    let store = Store::open(&config).unwrap();
    let col = notes(&store);
    assert_eq!(col.len().unwrap(), 2);
    assert_eq!(col.read(&Key::from("n1")).unwrap(), Some(note("n1", "first")));
    assert_eq!(
        col.count_index("body", &Key::Start, &Key::End).unwrap(),
        2,
        "secondary maps persist alongside the primary"
    );
}

#[test]
fn rollback_reverts_collections_to_a_committed_version() {
    let store = Store::in_memory();
    let col = notes(&store);

    col.insert(&note("n1", "keep")).unwrap();
    let version = store.commit().unwrap();
    col.insert(&note("n2", "discard")).unwrap();

    store.rollback_to(version).unwrap();

    assert_eq!(col.len().unwrap(), 1);
    assert!(col.contains(&Key::from("n1")).unwrap());
    assert!(!col.contains(&Key::from("n2")).unwrap());
    assert_eq!(
        col.count_index("body", &Key::Start, &Key::End).unwrap(),
        1,
        "secondary maps roll back with the primary"
    );
}

#[test]
fn delete_map_and_listing() {
    let store = Store::in_memory();
    let col = notes(&store);
    col.insert(&note("n1", "body")).unwrap();

    assert_eq!(store.list_collections().unwrap(), vec!["notes".to_string()]);

    store.delete_map("notes.body").unwrap();
    assert_eq!(
        col.count_index("body", &Key::Start, &Key::End).unwrap(),
        0,
        "dropping a secondary map empties it for live handles"
    );
    assert_eq!(store.list_collections().unwrap(), vec!["notes".to_string()]);
}

#[test]
fn stream_adaptor_honors_demand_cancellation_and_completion() {
    let store = Store::in_memory();
    let col = notes(&store);
    for i in 0..5 {
        col.insert(&note(&format!("n{i}"), "body")).unwrap();
    }

    // Demand-driven delivery.
    let mut stream = CursorStream::new(col.query(Scan::all()).unwrap());
    let mut seen = Vec::new();
    let state = stream.request(2, |item| seen.push(item.0)).unwrap();
    assert_eq!(state, StreamState::Active);
    assert_eq!(seen, ["n0", "n1"]);

    let state = stream.request(10, |item| seen.push(item.0)).unwrap();
    assert_eq!(state, StreamState::Complete);
    assert_eq!(seen.len(), 5);

    // Cancellation halts before the next pull.
    let mut stream = CursorStream::new(col.query(Scan::all()).unwrap());
    let handle = stream.cancel_handle();
    handle.cancel();
    let state = stream.request(10, |_| panic!("cancelled stream must not deliver")).unwrap();
    assert_eq!(state, StreamState::Cancelled);
}

#[test]
fn key_macro_composes_and_converts() {
    assert_eq!(key!("plain"), Key::from("plain"));
    assert_eq!(
        key![KeyPart::Int(7), KeyPart::Str("x")],
        Key::compose(&[KeyPart::Int(7), KeyPart::Str("x")])
    );
}
