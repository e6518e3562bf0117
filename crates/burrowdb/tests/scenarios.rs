//! End-to-end scenarios driven through the public API only.

use burrowdb::{
    Codec, CodecError, Collection, CollectionError, Error, IndexDef, Key, Scan, Store,
};

///
/// LabelCodec
///
/// Stores plain strings. The primary key is the string itself behind an
/// optional fixed prefix; one non-unique secondary indexes the label
/// length so duplicate-insert tests can watch an untouched secondary.
///

struct LabelCodec {
    indices: Vec<IndexDef<String>>,
}

impl LabelCodec {
    fn new(prefix: &'static str) -> Self {
        Self {
            indices: vec![
                IndexDef::new("default", true, move |label: &String| {
                    Key::from(format!("{prefix}{label}"))
                }),
                IndexDef::new("length", false, |label: &String| {
                    Key::compose(&[burrowdb::KeyPart::Long(label.len() as i64)])
                }),
            ],
        }
    }
}

impl Codec for LabelCodec {
    type Item = String;

    fn encode(&self, data: &String, _primary_key: &Key) -> Result<Vec<u8>, CodecError> {
        Ok(data.as_bytes().to_vec())
    }

    fn decode(&self, bytes: &[u8], _primary_key: Option<&Key>) -> Result<String, CodecError> {
        String::from_utf8(bytes.to_vec()).map_err(|err| CodecError::Decode(err.to_string()))
    }

    fn indices(&self) -> &[IndexDef<String>] {
        &self.indices
    }
}

fn labels(prefix: &'static str, n: usize) -> Collection<LabelCodec> {
    let store = Store::in_memory();
    let col = store.collection("labels", LabelCodec::new(prefix)).unwrap();
    for i in 0..n {
        col.insert(&format!("String {i}")).unwrap();
    }
    col
}

fn drain(mut cursor: burrowdb::Cursor<LabelCodec>) -> Vec<String> {
    let mut out = Vec::new();
    while let Some(label) = cursor.next_entry().unwrap() {
        out.push(label);
    }
    out
}

#[test]
fn full_scan_yields_lexicographic_order() {
    let col = labels("", 11);

    let got = drain(col.query(Scan::all()).unwrap());

    assert_eq!(
        got,
        [
            "String 0", "String 1", "String 10", "String 2", "String 3", "String 4", "String 5",
            "String 6", "String 7", "String 8", "String 9",
        ]
    );
}

#[test]
fn reverse_scan_with_start_and_count() {
    let col = labels("", 11);

    let got = drain(col.query(Scan::all().start(2).count(2).reverse()).unwrap());

    assert_eq!(got, ["String 7", "String 6"]);
}

#[test]
fn bounded_scan_with_prefixed_keys() {
    let col = labels("1.", 11);

    let got = drain(
        col.query(
            Scan::all()
                .lower("1.String 10")
                .upper("1.String 8")
                .start(2)
                .count(10),
        )
        .unwrap(),
    );

    assert_eq!(
        got,
        ["String 3", "String 4", "String 5", "String 6", "String 7", "String 8"]
    );
}

#[test]
fn scan_completes_across_a_mid_flight_deletion() {
    let col = labels("", 10);

    let mut cursor = col.query(Scan::all().upper("String 7")).unwrap();
    let mut got = Vec::new();
    for _ in 0..3 {
        got.push(cursor.next_entry().unwrap().unwrap());
    }

    col.delete(&Key::from("String 7")).unwrap();

    while let Some(label) = cursor.next_entry().unwrap() {
        got.push(label);
    }

    assert_eq!(got.len(), 7);
    assert_eq!(got.last().map(String::as_str), Some("String 6"));
}

#[test]
fn non_unique_primary_is_rejected_before_any_write() {
    let store = Store::in_memory();
    let codec = LabelCodec {
        indices: vec![IndexDef::new("default", false, |label: &String| {
            Key::from(label.as_str())
        })],
    };

    let err = store.collection("labels", codec).unwrap_err();

    assert!(matches!(
        err,
        Error::Collection(CollectionError::NonUniquePrimary { .. })
    ));
    assert!(store.list_collections().unwrap().is_empty());
}

#[test]
fn duplicate_insert_fails_and_leaves_secondaries_alone() {
    let col = labels("", 3);
    let secondary_before = col.count_index("length", &Key::Start, &Key::End).unwrap();

    let err = col.insert(&"String 1".to_string()).unwrap_err();

    assert!(matches!(
        &err,
        Error::Collection(CollectionError::Duplicate { index }) if index == "default"
    ));
    assert_eq!(
        col.count_index("length", &Key::Start, &Key::End).unwrap(),
        secondary_before
    );
    assert_eq!(col.len().unwrap(), 3);
}

#[test]
fn count_walks_bounds_inclusively() {
    let col = labels("", 11);

    assert_eq!(col.count(&Key::Start, &Key::End).unwrap(), 11);
    assert_eq!(
        col.count(&Key::from("String 2"), &Key::from("String 5")).unwrap(),
        4
    );
    assert_eq!(col.count_index("length", &Key::Start, &Key::End).unwrap(), 11);
}

#[test]
fn bulk_delete_removes_elements_as_they_are_yielded() {
    let col = labels("", 5);

    let mut cursor = col.delete_range(Scan::all().count(2)).unwrap();
    assert_eq!(cursor.next_entry().unwrap().as_deref(), Some("String 0"));
    assert_eq!(cursor.next_entry().unwrap().as_deref(), Some("String 1"));
    assert_eq!(cursor.next_entry().unwrap(), None);
    drop(cursor);

    assert_eq!(col.len().unwrap(), 3);
    assert!(!col.contains(&Key::from("String 0")).unwrap());
    assert!(col.contains(&Key::from("String 2")).unwrap());
}
