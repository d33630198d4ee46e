//! Explicit key-set and prefixed migrations.

use crate::common::{all_keys, attach_map, cluster};
use keyfab::{MigrationFlag, Status};

#[test]
fn migrate_keys_keep_original() {
    let cluster = cluster("keys-keep");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");

    src.put(b"k1", b"v1").unwrap();
    src.put(b"k2", b"v2").unwrap();
    src.put(b"other", b"v3").unwrap();

    src.migrate_keys(
        &[b"k1".to_vec(), b"k2".to_vec()],
        &dst,
        MigrationFlag::KeepOriginal,
    )
    .unwrap();

    // In scope: readable on both sides.
    assert_eq!(dst.get(b"k1", 8).unwrap(), b"v1");
    assert_eq!(dst.get(b"k2", 8).unwrap(), b"v2");
    assert_eq!(src.get(b"k1", 8).unwrap(), b"v1");
    // Out of scope: untouched.
    assert!(!dst.exists(b"other").unwrap());
}

#[test]
fn migrate_keys_remove_original() {
    let cluster = cluster("keys-remove");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");

    src.put(b"k1", b"v1").unwrap();
    src.put(b"k2", b"v2").unwrap();

    src.migrate_keys(
        &[b"k1".to_vec(), b"k2".to_vec()],
        &dst,
        MigrationFlag::RemoveOriginal,
    )
    .unwrap();

    assert!(!src.exists(b"k1").unwrap());
    assert!(!src.exists(b"k2").unwrap());
    assert_eq!(dst.get(b"k1", 8).unwrap(), b"v1");
}

#[test]
fn migrate_keys_skips_absent_members() {
    let cluster = cluster("keys-absent");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");
    src.put(b"present", b"v").unwrap();

    src.migrate_keys(
        &[b"ghost".to_vec(), b"present".to_vec()],
        &dst,
        MigrationFlag::KeepOriginal,
    )
    .unwrap();
    assert_eq!(dst.get(b"present", 8).unwrap(), b"v");
    assert!(!dst.exists(b"ghost").unwrap());
}

#[test]
fn migrate_prefixed_remove_original() {
    let cluster = cluster("prefix-remove");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");

    src.put(b"k1", b"v1").unwrap();
    src.put(b"k2", b"v2").unwrap();
    src.put(b"other", b"v3").unwrap();

    src.migrate_keys_prefixed(b"k", &dst, MigrationFlag::RemoveOriginal)
        .unwrap();

    assert_eq!(all_keys(&dst), vec![b"k1".to_vec(), b"k2".to_vec()]);
    assert_eq!(all_keys(&src), vec![b"other".to_vec()]);
}

#[test]
fn migrate_to_unknown_destination_database_fails() {
    let cluster = cluster("keys-bad-dst");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");
    src.put(b"k", b"v").unwrap();

    // Destination database disappears before the migration runs.
    cluster.destination.remove_database(dst.id()).unwrap();

    let err = src
        .migrate_keys(&[b"k".to_vec()], &dst, MigrationFlag::RemoveOriginal)
        .unwrap_err();
    assert_eq!(err.status(), Status::Migration);
    // The failing key was not erased.
    assert!(src.exists(b"k").unwrap());
}
