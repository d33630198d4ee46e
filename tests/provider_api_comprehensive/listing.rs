//! Listing and pagination through the client.

use crate::common::{attach_and_open, test_node};
use keyfab::{BackendKind, DatabaseConfig, Status};
use std::sync::Arc;

#[test]
fn prefix_listing_in_order() {
    let node = test_node("list-prefix");
    let db = attach_and_open(&node, "A");
    db.put(b"app_1", b"a").unwrap();
    db.put(b"app_2", b"b").unwrap();
    db.put(b"zoo", b"c").unwrap();

    let keys = db.list_keys(b"", b"app_", 10, 32).unwrap();
    assert_eq!(keys, vec![b"app_1".to_vec(), b"app_2".to_vec()]);
}

#[test]
fn start_key_strictly_excluded() {
    let node = test_node("list-start");
    let db = attach_and_open(&node, "A");
    for key in [b"a".as_slice(), b"b", b"c"] {
        db.put(key, b"x").unwrap();
    }
    let keys = db.list_keys(b"a", b"", 10, 16).unwrap();
    assert_eq!(keys, vec![b"b".to_vec(), b"c".to_vec()]);
}

#[test]
fn pagination_by_last_key() {
    let node = test_node("list-pages");
    let db = attach_and_open(&node, "A");
    for i in 0..10u32 {
        db.put(format!("key-{:02}", i).as_bytes(), b"v").unwrap();
    }

    let mut seen = Vec::new();
    let mut start = Vec::new();
    loop {
        let page = db.list_keys(&start, b"", 3, 16).unwrap();
        if page.is_empty() {
            break;
        }
        start = page.last().unwrap().clone();
        seen.extend(page);
    }
    let expected: Vec<Vec<u8>> = (0..10u32)
        .map(|i| format!("key-{:02}", i).into_bytes())
        .collect();
    assert_eq!(seen, expected);
}

#[test]
fn undersized_slots_recover_via_true_sizes() {
    let node = test_node("list-sizes");
    let db = attach_and_open(&node, "A");
    db.put(b"quite-a-long-key-name", b"v").unwrap();

    // Manual inout form: the failed call rewrites the capacities.
    let mut caps = vec![4u64; 2];
    let err = db.try_list_keys(b"", b"", &mut caps).unwrap_err();
    assert_eq!(err.status(), Status::Size);
    assert_eq!(caps[0], 21);

    let keys = db.try_list_keys(b"", b"", &mut caps).unwrap();
    assert_eq!(keys, vec![b"quite-a-long-key-name".to_vec()]);

    // Convenience form retries internally.
    let keys = db.list_keys(b"", b"", 2, 4).unwrap();
    assert_eq!(keys, vec![b"quite-a-long-key-name".to_vec()]);
}

#[test]
fn list_keyvals_returns_pairs() {
    let node = test_node("list-keyvals");
    let db = attach_and_open(&node, "A");
    db.put(b"k1", b"first").unwrap();
    db.put(b"k2", b"second").unwrap();

    let pairs = db.list_keyvals(b"", b"", 10, 16, 16).unwrap();
    assert_eq!(
        pairs,
        vec![
            (b"k1".to_vec(), b"first".to_vec()),
            (b"k2".to_vec(), b"second".to_vec()),
        ]
    );
}

#[test]
fn listing_contract_holds_across_backends() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_node("list-backends");
    node.provider
        .attach_database(&DatabaseConfig::in_memory("mapped", BackendKind::Map))
        .unwrap();
    node.provider
        .attach_database(&DatabaseConfig::persistent(
            "logged",
            BackendKind::LogStore,
            dir.path().join("logged"),
        ))
        .unwrap();
    node.provider
        .attach_database(&DatabaseConfig::persistent(
            "treed",
            BackendKind::BtreeStore,
            dir.path().join("treed.redb"),
        ))
        .unwrap();

    for name in ["mapped", "logged", "treed"] {
        let db = node.handle.open(name).unwrap();
        db.put(b"app_1", b"a").unwrap();
        db.put(b"app_2", b"b").unwrap();
        db.put(b"zoo", b"c").unwrap();

        // Prefix filter and order.
        let keys = db.list_keys(b"", b"app_", 10, 32).unwrap();
        assert_eq!(keys, vec![b"app_1".to_vec(), b"app_2".to_vec()], "{}", name);

        // Start key strictly excluded.
        let keys = db.list_keys(b"app_1", b"", 10, 32).unwrap();
        assert_eq!(keys, vec![b"app_2".to_vec(), b"zoo".to_vec()], "{}", name);

        // Zero slots is a hard cap everywhere, never "unbounded".
        assert!(db.list_keys(b"", b"", 0, 16).unwrap().is_empty(), "{}", name);
        assert!(
            db.list_keyvals(b"", b"", 0, 16, 16).unwrap().is_empty(),
            "{}",
            name
        );

        // Pairs come back from every backend the same way.
        let pairs = db.list_keyvals(b"app_2", b"", 10, 16, 16).unwrap();
        assert_eq!(pairs, vec![(b"zoo".to_vec(), b"c".to_vec())], "{}", name);
    }
}

#[test]
fn custom_comparator_drives_listing_order() {
    let node = test_node("list-comparator");
    node.provider
        .register_comparator("reverse", Arc::new(|a: &[u8], b: &[u8]| b.cmp(a)))
        .unwrap();
    node.provider
        .attach_database(
            &DatabaseConfig::in_memory("backwards", BackendKind::Map).with_comparator("reverse"),
        )
        .unwrap();
    let db = node.handle.open("backwards").unwrap();
    for key in [b"a".as_slice(), b"b", b"c"] {
        db.put(key, b"x").unwrap();
    }

    let keys = db.list_keys(b"", b"", 10, 8).unwrap();
    assert_eq!(keys, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
}

#[test]
fn duplicate_comparator_registration_fails() {
    let node = test_node("list-comparator-dup");
    node.provider
        .register_comparator("order", Arc::new(|a: &[u8], b: &[u8]| a.cmp(b)))
        .unwrap();
    let err = node
        .provider
        .register_comparator("order", Arc::new(|a: &[u8], b: &[u8]| a.cmp(b)))
        .unwrap_err();
    assert_eq!(err.status(), Status::CompFunc);
}

#[test]
fn btree_store_refuses_comparator_at_attach() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_node("list-btree-comparator");
    node.provider
        .register_comparator("reverse", Arc::new(|a: &[u8], b: &[u8]| b.cmp(a)))
        .unwrap();
    let config = DatabaseConfig::persistent(
        "tree",
        BackendKind::BtreeStore,
        dir.path().join("tree.redb"),
    )
    .with_comparator("reverse");
    let err = node.provider.attach_database(&config).unwrap_err();
    assert_eq!(err.status(), Status::CompFunc);
}
