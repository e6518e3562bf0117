//! Module: counter
//! Responsibility: bounded entry counts over one index map.
//! A count is a degenerate scan: no limit, no stride, no dereference; it
//! steps physical keys from the lower bound until the upper bound is
//! exceeded or the resolved upper key is reached.

use crate::{
    cursor::{resolve_lower_key, resolve_upper_key, upper_admits},
    key::Key,
    kv::{BackendError, KvMap},
};

/// Number of physical entries between the bounds, both inclusive. O(k) in
/// entries visited.
pub(crate) fn count_range(
    map: &dyn KvMap,
    lower: &Key,
    upper: &Key,
) -> Result<u64, BackendError> {
    let Some(lower_key) = resolve_lower_key(map, lower)? else {
        return Ok(0);
    };
    let Some(upper_key) = resolve_upper_key(map, upper)? else {
        return Ok(0);
    };
    if lower_key > upper_key {
        return Ok(0);
    }

    // The lower key is admitted: it sits at or below an admitted key, and
    // the admitted range is contiguous.
    let mut count = 1u64;
    let mut key = lower_key;
    while key != upper_key {
        let Some(next) = map.higher_key(&key)? else {
            break;
        };
        if !upper_admits(upper, &next) {
            break;
        }
        count += 1;
        key = next;
    }

    Ok(count)
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{KvBackend, MemoryKv};

    fn seeded() -> std::sync::Arc<dyn KvMap> {
        let backend = MemoryKv::new();
        let map = backend.open_map("m").unwrap();
        for key in ["a", "ab", "b", "c", "d"] {
            map.put(key.as_bytes(), b"v").unwrap();
        }
        map
    }

    #[test]
    fn counts_are_inclusive_of_both_bounds() {
        let map = seeded();

        let n = count_range(map.as_ref(), &Key::from("ab"), &Key::from("c")).unwrap();
        assert_eq!(n, 3);

        let n = count_range(map.as_ref(), &Key::Start, &Key::End).unwrap();
        assert_eq!(n, 5);

        let n = count_range(map.as_ref(), &Key::from("a"), &Key::from("a")).unwrap();
        assert_eq!(n, 2, "the bound as a prefix admits its extensions");
    }

    #[test]
    fn empty_ranges_count_zero() {
        let map = seeded();

        let n = count_range(map.as_ref(), &Key::from("x"), &Key::End).unwrap();
        assert_eq!(n, 0);

        let n = count_range(map.as_ref(), &Key::from("c"), &Key::from("b")).unwrap();
        assert_eq!(n, 0);

        let backend = MemoryKv::new();
        let empty = backend.open_map("e").unwrap();
        let n = count_range(empty.as_ref(), &Key::Start, &Key::End).unwrap();
        assert_eq!(n, 0);
    }
}
