//! Registry lifecycle and concurrency behavior seen from clients.

use crate::common::{attach_and_open, test_node};
use keyfab::{BackendKind, DatabaseConfig, Status};
use std::sync::Arc;

#[test]
fn open_count_and_list_via_rpc() {
    let node = test_node("life-list");
    for name in ["first", "second", "third"] {
        node.provider
            .attach_database(&DatabaseConfig::in_memory(name, BackendKind::Map))
            .unwrap();
    }

    assert_eq!(node.handle.count_databases().unwrap(), 3);
    let entries = node.handle.list_databases(10).unwrap();
    let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["first", "second", "third"]);

    let db = node.handle.open("second").unwrap();
    assert_eq!(db.id(), entries[1].id);

    let err = node.handle.open("fourth").unwrap_err();
    assert_eq!(err.status(), Status::DbName);
}

#[test]
fn remove_all_empties_the_provider() {
    let node = test_node("life-remove-all");
    for name in ["a", "b"] {
        node.provider
            .attach_database(&DatabaseConfig::in_memory(name, BackendKind::Map))
            .unwrap();
    }
    node.provider.remove_all_databases();
    assert_eq!(node.handle.count_databases().unwrap(), 0);
}

#[test]
fn reattach_after_remove_gets_fresh_id() {
    let node = test_node("life-reattach");
    let db = attach_and_open(&node, "ephemeral");
    let old_id = db.id();
    node.provider.remove_database(old_id).unwrap();

    node.provider
        .attach_database(&DatabaseConfig::in_memory("ephemeral", BackendKind::Map))
        .unwrap();
    let db = node.handle.open("ephemeral").unwrap();
    assert_ne!(db.id(), old_id);
}

#[test]
fn concurrent_clients_share_one_database() {
    let node = test_node("life-concurrent");
    let db = attach_and_open(&node, "shared");

    let mut handles = Vec::new();
    for t in 0..4 {
        let db = db.clone();
        handles.push(std::thread::spawn(move || {
            for i in 0..25 {
                let key = format!("t{}-k{}", t, i);
                db.put(key.as_bytes(), b"v").unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // Every write from every thread landed.
    let keys = db.list_keys(b"", b"", 200, 16).unwrap();
    assert_eq!(keys.len(), 100);
}

#[test]
fn single_op_atomic_with_respect_to_get() {
    let node = test_node("life-atomic");
    let db = attach_and_open(&node, "shared");
    db.put(b"k", b"aaaa").unwrap();

    let writer = {
        let db = db.clone();
        std::thread::spawn(move || {
            for _ in 0..50 {
                db.put(b"k", b"aaaa").unwrap();
                db.put(b"k", b"bbbb").unwrap();
            }
        })
    };
    // A concurrent get sees one of the two written values, never a blend.
    for _ in 0..50 {
        let value = db.get(b"k", 8).unwrap();
        assert!(value == b"aaaa" || value == b"bbbb", "torn read: {:?}", value);
    }
    writer.join().unwrap();
}

#[test]
fn persistent_database_reattaches_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_node("life-persist");
    let config = DatabaseConfig::persistent(
        "journal",
        BackendKind::LogStore,
        dir.path().join("journal"),
    );

    let id = node.provider.attach_database(&config).unwrap();
    let db = node.handle.open("journal").unwrap();
    db.put(b"durable", b"yes").unwrap();
    // Remove detaches but leaves the files.
    node.provider.remove_database(id).unwrap();

    node.provider.attach_database(&config).unwrap();
    let db = node.handle.open("journal").unwrap();
    assert_eq!(db.get(b"durable", 8).unwrap(), b"yes");
}

#[test]
fn comparator_shared_across_databases() {
    let node = test_node("life-comparator");
    node.provider
        .register_comparator("reverse", Arc::new(|a: &[u8], b: &[u8]| b.cmp(a)))
        .unwrap();
    for name in ["one", "two"] {
        node.provider
            .attach_database(
                &DatabaseConfig::in_memory(name, BackendKind::Map).with_comparator("reverse"),
            )
            .unwrap();
    }
    assert_eq!(node.handle.count_databases().unwrap(), 2);
}
