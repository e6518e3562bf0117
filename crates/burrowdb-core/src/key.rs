//! Module: key
//! Responsibility: the ordered byte-key contract shared by every index map.
//! Does not own: key generation policy (that belongs to codecs) or storage.
//! Boundary: collections and cursors compare, bound, and compose keys here.

use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// Key
///
/// Immutable byte key with a total order: unsigned byte-wise comparison,
/// shorter-is-less across a shared prefix. `Start` sorts below every real
/// key and `End` above; each sentinel is equal only to itself.
///
/// The sentinels mean "no lower bound" / "no upper bound" in range scans.
/// They are never stored in a map and are never a prefix of anything.
///

#[derive(Clone, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum Key {
    Start,
    Bytes(Box<[u8]>),
    End,
}

impl Key {
    /// Build a key from raw bytes.
    #[must_use]
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::Bytes(bytes.into().into_boxed_slice())
    }

    /// Concatenate big-endian part encodings, most-significant part first.
    ///
    /// Parts encode as: `Int` 4 bytes, `Long` 8 bytes, `Instant` 8 bytes of
    /// signed epoch-millis, `Str` raw UTF-8 with no length prefix. A
    /// variable-length part anywhere but last makes the composite ambiguous;
    /// that is the caller's responsibility and is not checked here.
    #[must_use]
    pub fn compose(parts: &[KeyPart<'_>]) -> Self {
        let mut buf = Vec::with_capacity(parts.len() * 8);
        for part in parts {
            match part {
                KeyPart::Int(v) => buf.extend_from_slice(&v.to_be_bytes()),
                KeyPart::Long(v) => buf.extend_from_slice(&v.to_be_bytes()),
                KeyPart::Instant(t) => buf.extend_from_slice(&epoch_millis(*t).to_be_bytes()),
                KeyPart::Str(s) => buf.extend_from_slice(s.as_bytes()),
            }
        }

        Self::Bytes(buf.into_boxed_slice())
    }

    /// Byte content of a real key; sentinels have none.
    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(bytes) => Some(bytes),
            Self::Start | Self::End => None,
        }
    }

    #[must_use]
    pub const fn is_sentinel(&self) -> bool {
        matches!(self, Self::Start | Self::End)
    }

    /// True iff `self` is a real key whose bytes lead `other`.
    ///
    /// Sentinels are never a prefix of, and have no prefix among, real keys.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        match other.as_bytes() {
            Some(bytes) => self.is_prefix_of_bytes(bytes),
            None => false,
        }
    }

    /// Prefix test against a physical map key.
    #[must_use]
    pub fn is_prefix_of_bytes(&self, other: &[u8]) -> bool {
        match self {
            Self::Bytes(prefix) => {
                prefix.len() <= other.len() && other[..prefix.len()] == prefix[..]
            }
            Self::Start | Self::End => false,
        }
    }

    /// Sentinel-aware comparison against a physical map key.
    #[must_use]
    pub fn cmp_bytes(&self, other: &[u8]) -> Ordering {
        match self {
            Self::Start => Ordering::Less,
            Self::End => Ordering::Greater,
            Self::Bytes(bytes) => bytes[..].cmp(other),
        }
    }
}

impl Ord for Key {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Start, Self::Start) | (Self::End, Self::End) => Ordering::Equal,
            (Self::Start, _) | (_, Self::End) => Ordering::Less,
            (_, Self::Start) | (Self::End, _) => Ordering::Greater,
            // Slice comparison is already unsigned lexicographic with
            // shorter-is-less on a shared prefix.
            (Self::Bytes(a), Self::Bytes(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Key {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(Ord::cmp(self, other))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "<start>"),
            Self::End => write!(f, "<end>"),
            Self::Bytes(bytes) => {
                for byte in bytes.iter() {
                    if byte.is_ascii_graphic() || *byte == b' ' {
                        write!(f, "{}", *byte as char)?;
                    } else {
                        write!(f, "\\x{byte:02x}")?;
                    }
                }
                Ok(())
            }
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Self::from_bytes(s.as_bytes())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Self::from_bytes(s.into_bytes())
    }
}

impl From<&[u8]> for Key {
    fn from(bytes: &[u8]) -> Self {
        Self::from_bytes(bytes)
    }
}

impl From<Vec<u8>> for Key {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_bytes(bytes)
    }
}

///
/// KeyPart
///
/// One component of a composite key. See [`Key::compose`].
///

#[derive(Clone, Copy, Debug)]
pub enum KeyPart<'a> {
    Int(i32),
    Long(i64),
    Instant(SystemTime),
    Str(&'a str),
}

/// Signed milliseconds since the Unix epoch.
#[allow(clippy::cast_possible_truncation)]
fn epoch_millis(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

/// Smallest byte string strictly greater than every extension of `bytes`.
///
/// Increments the last non-0xFF byte and truncates behind it; `None` means
/// no such string exists (all bytes 0xFF) and callers treat the successor
/// as the end of the keyspace.
pub(crate) fn prefix_successor(bytes: &[u8]) -> Option<Vec<u8>> {
    let mut out = bytes.to_vec();
    loop {
        match out.pop() {
            None => return None,
            Some(0xFF) => {}
            Some(byte) => {
                out.push(byte + 1);
                return Some(out);
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_unsigned_and_prefix_aware() {
        let a = Key::from("a");
        let ab = Key::from("ab");
        let b = Key::from("b");
        let hi = Key::from_bytes(vec![0x80]);

        assert!(a < ab, "shorter key must sort below its extension");
        assert!(ab < b);
        assert!(b < hi, "comparison must treat bytes as unsigned");
    }

    #[test]
    fn sentinels_bound_the_keyspace() {
        let keys = [Key::from(""), Key::from("a"), Key::from_bytes(vec![0xFF; 4])];

        for key in &keys {
            assert!(Key::Start < *key, "Start must sort below {key}");
            assert!(*key < Key::End, "End must sort above {key}");
        }

        assert_eq!(Key::Start.cmp(&Key::Start), Ordering::Equal);
        assert_eq!(Key::End.cmp(&Key::End), Ordering::Equal);
        assert!(Key::Start < Key::End);
    }

    #[test]
    fn prefix_relation_matches_definition() {
        let p = Key::from("str");
        assert!(p.is_prefix_of(&Key::from("string")));
        assert!(p.is_prefix_of(&Key::from("str")));
        assert!(!p.is_prefix_of(&Key::from("st")));
        assert!(!p.is_prefix_of(&Key::from("sx")));

        assert!(!Key::Start.is_prefix_of(&Key::from("a")));
        assert!(!Key::End.is_prefix_of(&Key::from("a")));
        assert!(!p.is_prefix_of(&Key::Start));
        assert!(!p.is_prefix_of(&Key::End));

        // The empty key leads every real key.
        assert!(Key::from("").is_prefix_of(&Key::from("a")));
    }

    #[test]
    fn compose_layout_is_big_endian_fixed_width() {
        let key = Key::compose(&[KeyPart::Int(1), KeyPart::Long(-1), KeyPart::Str("x")]);
        let bytes = key.as_bytes().unwrap();

        assert_eq!(bytes.len(), 4 + 8 + 1);
        assert_eq!(&bytes[..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..12], &[0xFF; 8]);
        assert_eq!(&bytes[12..], b"x");
    }

    #[test]
    fn compose_instant_is_signed_epoch_millis() {
        let t = UNIX_EPOCH + std::time::Duration::from_millis(1_234);
        let key = Key::compose(&[KeyPart::Instant(t)]);

        assert_eq!(key.as_bytes().unwrap(), &1_234_i64.to_be_bytes());
    }

    #[test]
    fn compose_orders_most_significant_first() {
        let early = Key::compose(&[KeyPart::Int(1), KeyPart::Long(i64::MAX)]);
        let late = Key::compose(&[KeyPart::Int(2), KeyPart::Long(0)]);

        assert!(early < late, "leading part must dominate the order");
    }

    #[test]
    fn prefix_successor_increments_and_truncates() {
        assert_eq!(prefix_successor(b"ab"), Some(b"ac".to_vec()));
        assert_eq!(prefix_successor(&[0x01, 0xFF]), Some(vec![0x02]));
        assert_eq!(prefix_successor(&[0xFF, 0xFF]), None);
        assert_eq!(prefix_successor(&[]), None);
    }

    #[test]
    fn prefix_successor_bounds_the_prefix_range() {
        let prefix = Key::from("ab");
        let successor = prefix_successor(prefix.as_bytes().unwrap()).unwrap();

        for extension in [&b"ab"[..], b"ab\x00", b"abzzz", b"ab\xff\xff"] {
            assert!(prefix.is_prefix_of_bytes(extension));
            assert!(
                extension < successor.as_slice(),
                "extension must sort below the successor"
            );
        }
        assert!(b"ac".as_slice() >= successor.as_slice());
    }

    #[test]
    fn ord_agrees_with_cmp_bytes_fuzz() {
        const RUNS: usize = 2_000;

        let mut seed = 0x5151_7171_u64;
        let mut next_key = move || {
            seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
            let len = (seed >> 56) as usize % 6;
            let mut bytes = Vec::with_capacity(len);
            for _ in 0..len {
                seed = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
                bytes.push((seed >> 32) as u8);
            }
            bytes
        };

        for _ in 0..RUNS {
            let a = next_key();
            let b = next_key();
            let (ka, kb) = (Key::from_bytes(a.clone()), Key::from_bytes(b.clone()));

            assert_eq!(ka.cmp(&kb), ka.cmp_bytes(&b), "Ord and cmp_bytes diverged");
            assert_eq!(ka.cmp(&kb), a.cmp(&b), "Key order and byte order diverged");
            if ka.is_prefix_of(&kb) {
                assert!(ka <= kb, "a prefix must never sort above its extension");
            }
        }
    }
}
