//! Single-operation behavior through the client, across backends.

use crate::common::{attach_and_open, test_node};
use keyfab::{BackendKind, DatabaseConfig, Error, Status};

#[test]
fn put_get_roundtrip() {
    let node = test_node("single-roundtrip");
    let db = attach_and_open(&node, "A");

    db.put(b"alpha", b"1").unwrap();
    db.put(b"beta", b"22").unwrap();

    let value = db.get(b"alpha", 16).unwrap();
    assert_eq!(value, b"1");
    assert_eq!(db.length(b"beta").unwrap(), 2);
    assert!(!db.exists(b"gamma").unwrap());
}

#[test]
fn undersized_get_reports_required_size() {
    let node = test_node("single-undersized");
    let db = attach_and_open(&node, "A");
    db.put(b"k", b"0123456789ABCDEF").unwrap();

    match db.get(b"k", 4) {
        Err(Error::Size { needed, capacity }) => {
            assert_eq!(needed, 16);
            assert_eq!(capacity, 4);
        }
        other => panic!("expected size error, got {:?}", other),
    }
    // Full-capacity retry succeeds with the same bytes.
    assert_eq!(db.get(b"k", 16).unwrap(), b"0123456789ABCDEF");
}

#[test]
fn no_overwrite_preserves_first_value() {
    let node = test_node("single-no-overwrite");
    node.provider
        .attach_database(
            &DatabaseConfig::in_memory("guarded", BackendKind::Map).with_no_overwrite(),
        )
        .unwrap();
    let db = node.handle.open("guarded").unwrap();

    db.put(b"k", b"v1").unwrap();
    let err = db.put(b"k", b"v2").unwrap_err();
    assert_eq!(err.status(), Status::KeyExists);
    assert_eq!(db.get(b"k", 16).unwrap(), b"v1");
}

#[test]
fn erase_then_reads_fail() {
    let node = test_node("single-erase");
    let db = attach_and_open(&node, "A");
    db.put(b"k", b"v").unwrap();
    db.erase(b"k").unwrap();

    assert!(!db.exists(b"k").unwrap());
    assert_eq!(db.get(b"k", 8).unwrap_err().status(), Status::UnknownKey);
    assert_eq!(db.erase(b"k").unwrap_err().status(), Status::Erase);
}

#[test]
fn persistent_backends_serve_the_same_contract() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_node("single-persistent");
    for (name, kind, path) in [
        ("logged", BackendKind::LogStore, dir.path().join("logged")),
        (
            "treed",
            BackendKind::BtreeStore,
            dir.path().join("treed.redb"),
        ),
    ] {
        node.provider
            .attach_database(&DatabaseConfig::persistent(name, kind, path))
            .unwrap();
        let db = node.handle.open(name).unwrap();
        db.put(b"alpha", b"1").unwrap();
        db.put(b"beta", b"22").unwrap();
        assert_eq!(db.get(b"alpha", 8).unwrap(), b"1");
        assert_eq!(db.length(b"beta").unwrap(), 2);
        db.erase(b"alpha").unwrap();
        assert!(!db.exists(b"alpha").unwrap());
    }
}

#[test]
fn null_backend_discards_and_reports_absent() {
    let node = test_node("single-null");
    node.provider
        .attach_database(&DatabaseConfig::in_memory("void", BackendKind::Null))
        .unwrap();
    let db = node.handle.open("void").unwrap();

    db.put(b"k", b"v").unwrap();
    assert_eq!(db.get(b"k", 8).unwrap_err().status(), Status::UnknownKey);
    assert!(!db.exists(b"k").unwrap());
    assert!(db.list_keys(b"", b"", 4, 16).unwrap().is_empty());
}

#[test]
fn bulk_put_and_bulk_get_roundtrip() {
    let node = test_node("single-bulk");
    let db = attach_and_open(&node, "A");

    let value: Vec<u8> = (0..200u8).collect();
    db.bulk_put(b"wide", &value).unwrap();
    assert_eq!(db.bulk_get(b"wide", 256).unwrap(), value);

    match db.bulk_get(b"wide", 10) {
        Err(Error::Size { needed, .. }) => assert_eq!(needed, 200),
        other => panic!("expected size error, got {:?}", other),
    }

    // All client-side regions are released again.
    assert_eq!(node.fabric.bulk_registered_count(), 0);
}

#[test]
fn database_size_follows_backend_support() {
    let dir = tempfile::tempdir().unwrap();
    let node = test_node("single-size");

    node.provider
        .attach_database(&DatabaseConfig::persistent(
            "logged",
            BackendKind::LogStore,
            dir.path().join("logged"),
        ))
        .unwrap();
    let logged = node.handle.open("logged").unwrap();
    logged.put(b"k", b"some-bytes").unwrap();
    assert!(logged.database_size().unwrap() > 0);

    let mapped = attach_and_open(&node, "mapped");
    assert_eq!(
        mapped.database_size().unwrap_err().status(),
        Status::OpNotImpl
    );
}

#[test]
fn operations_on_unknown_database_fail() {
    let node = test_node("single-unknown-db");
    let db = attach_and_open(&node, "A");
    node.provider.remove_database(db.id()).unwrap();

    assert_eq!(db.put(b"k", b"v").unwrap_err().status(), Status::UnknownDb);
    assert_eq!(db.get(b"k", 8).unwrap_err().status(), Status::UnknownDb);
    assert_eq!(db.erase(b"k").unwrap_err().status(), Status::UnknownDb);
}
