//! Multi and packed operations through the client.

use crate::common::{attach_and_open, test_node};
use keyfab::Status;

fn pairs(entries: &[(&str, &str)]) -> Vec<(Vec<u8>, Vec<u8>)> {
    entries
        .iter()
        .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
        .collect()
}

fn keys(names: &[&str]) -> Vec<Vec<u8>> {
    names.iter().map(|k| k.as_bytes().to_vec()).collect()
}

#[test]
fn put_multi_then_get_multi_batch_law() {
    let node = test_node("batch-roundtrip");
    let db = attach_and_open(&node, "A");

    let batch = pairs(&[("k1", "v-one"), ("k2", ""), ("k3", "v-three")]);
    db.put_multi(&batch).unwrap();

    let fetched = db.get_multi(&keys(&["k1", "k2", "k3", "missing"]), 32).unwrap();
    assert_eq!(fetched[0], b"v-one");
    assert!(fetched[1].is_empty()); // genuinely empty value
    assert_eq!(fetched[2], b"v-three");
    assert!(fetched[3].is_empty()); // absent key, indistinguishable by design

    // length_multi per-entry sizes equal get_multi per-entry sizes.
    let lengths = db.length_multi(&keys(&["k1", "k2", "k3", "missing"])).unwrap();
    let got_sizes: Vec<u64> = fetched.iter().map(|v| v.len() as u64).collect();
    assert_eq!(lengths, got_sizes);
}

#[test]
fn get_multi_entry_over_capacity_is_zeroed() {
    let node = test_node("batch-capacity");
    let db = attach_and_open(&node, "A");
    db.put(b"long", b"0123456789").unwrap();
    db.put(b"short", b"ab").unwrap();

    let fetched = db.get_multi(&keys(&["long", "short"]), 4).unwrap();
    assert!(fetched[0].is_empty());
    assert_eq!(fetched[1], b"ab");
}

#[test]
fn exists_multi_flags() {
    let node = test_node("batch-exists");
    let db = attach_and_open(&node, "A");
    db.put(b"a", b"1").unwrap();
    db.put(b"c", b"3").unwrap();

    let flags = db.exists_multi(&keys(&["a", "b", "c", "d"])).unwrap();
    assert_eq!(flags, vec![true, false, true, false]);
}

#[test]
fn erase_multi_removes_present_keys() {
    let node = test_node("batch-erase");
    let db = attach_and_open(&node, "A");
    db.put_multi(&pairs(&[("a", "1"), ("b", "2"), ("c", "3")]))
        .unwrap();

    db.erase_multi(&keys(&["a", "c", "never-there"])).unwrap();
    assert!(!db.exists(b"a").unwrap());
    assert!(db.exists(b"b").unwrap());
    assert!(!db.exists(b"c").unwrap());
}

#[test]
fn put_multi_no_overwrite_short_circuits_but_keeps_earlier_writes() {
    let node = test_node("batch-short-circuit");
    node.provider
        .attach_database(
            &keyfab::DatabaseConfig::in_memory("guarded", keyfab::BackendKind::Map)
                .with_no_overwrite(),
        )
        .unwrap();
    let db = node.handle.open("guarded").unwrap();
    db.put(b"dup", b"original").unwrap();

    let err = db
        .put_multi(&pairs(&[("before", "1"), ("dup", "2"), ("after", "3")]))
        .unwrap_err();
    assert_eq!(err.status(), Status::KeyExists);

    assert!(db.exists(b"before").unwrap());
    assert!(!db.exists(b"after").unwrap());
    assert_eq!(db.get(b"dup", 16).unwrap(), b"original");
}

#[test]
fn put_packed_then_get_packed() {
    let node = test_node("packed-roundtrip");
    let db = attach_and_open(&node, "A");

    db.put_packed(&pairs(&[("p1", "alpha"), ("p2", "beta")]))
        .unwrap();
    let result = db.get_packed(&keys(&["p1", "p2"]), 64).unwrap();
    assert_eq!(result.status, Status::Success);
    assert_eq!(result.values[0], b"alpha");
    assert_eq!(result.values[1], b"beta");
}

#[test]
fn get_packed_overflow_delivers_prefix() {
    let node = test_node("packed-overflow");
    let db = attach_and_open(&node, "A");
    db.put(b"a", b"12345").unwrap();
    db.put(b"b", b"123456").unwrap();
    db.put(b"c", b"1").unwrap();

    // 8 bytes total: "a" fits, "b" overflows, "c" stays zeroed even
    // though it would fit.
    let result = db.get_packed(&keys(&["a", "b", "c"]), 8).unwrap();
    assert_eq!(result.status, Status::Size);
    assert_eq!(result.values[0], b"12345");
    assert!(result.values[1].is_empty());
    assert!(result.values[2].is_empty());
}

#[test]
fn length_packed_matches_values() {
    let node = test_node("packed-length");
    let db = attach_and_open(&node, "A");
    db.put(b"k", b"sixsix").unwrap();

    let sizes = db.length_packed(&keys(&["k", "missing"])).unwrap();
    assert_eq!(sizes, vec![6, 0]);
}

#[test]
fn batch_regions_never_leak() {
    let node = test_node("batch-leak");
    let db = attach_and_open(&node, "A");

    db.put_multi(&pairs(&[("a", "1")])).unwrap();
    let _ = db.get_multi(&keys(&["a", "b"]), 8).unwrap();
    let _ = db.get_packed(&keys(&["a"]), 2).unwrap();
    let _ = db.length_multi(&keys(&["a"])).unwrap();
    let _ = db.exists_multi(&keys(&["a"])).unwrap();
    db.erase_multi(&keys(&["a"])).unwrap();

    // Error paths release regions too.
    node.provider.remove_database(db.id()).unwrap();
    assert!(db.put_multi(&pairs(&[("x", "1")])).is_err());
    assert!(db.get_multi(&keys(&["x"]), 8).is_err());

    assert_eq!(node.fabric.bulk_registered_count(), 0);
}
