//! Whole-database relocation through the file mover.

use crate::common::cluster;
use keyfab::{BackendKind, DatabaseConfig, ProviderId, Status};

#[test]
fn log_store_relocates_with_source_removal() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster("whole-log");

    cluster
        .source
        .attach_database(&DatabaseConfig::persistent(
            "D",
            BackendKind::LogStore,
            dir.path().join("src-root"),
        ))
        .unwrap();
    let src_db = cluster.source_handle.open("D").unwrap();
    src_db.put(b"one", b"1").unwrap();
    src_db.put(b"two", b"22").unwrap();
    src_db.put(b"three", b"333").unwrap();

    src_db
        .migrate_database(
            cluster.destination_handle.addr(),
            ProviderId::new(1),
            &dir.path().join("dst-root"),
            true,
        )
        .unwrap();

    // Source no longer knows the name; destination serves it under a
    // fresh id.
    let err = cluster.source_handle.open("D").unwrap_err();
    assert_eq!(err.status(), Status::DbName);
    let dst_db = cluster.destination_handle.open("D").unwrap();
    assert_ne!(dst_db.id(), src_db.id());
    assert_eq!(dst_db.get(b"one", 8).unwrap(), b"1");
    assert_eq!(dst_db.get(b"two", 8).unwrap(), b"22");
    assert_eq!(dst_db.get(b"three", 8).unwrap(), b"333");

    // remove_src deleted the source segment files.
    assert!(!dir.path().join("src-root").join("log-000001.seg").exists());
}

#[test]
fn btree_store_relocates_and_source_stays_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster("whole-btree");

    cluster
        .source
        .attach_database(&DatabaseConfig::persistent(
            "tree",
            BackendKind::BtreeStore,
            dir.path().join("tree.redb"),
        ))
        .unwrap();
    let src_db = cluster.source_handle.open("tree").unwrap();
    src_db.put(b"k", b"v").unwrap();

    src_db
        .migrate_database(
            cluster.destination_handle.addr(),
            ProviderId::new(1),
            &dir.path().join("landing"),
            false,
        )
        .unwrap();

    // Without remove_src the source database keeps serving.
    assert_eq!(src_db.get(b"k", 8).unwrap(), b"v");
    let dst_db = cluster.destination_handle.open("tree").unwrap();
    assert_eq!(dst_db.get(b"k", 8).unwrap(), b"v");
}

#[test]
fn relocated_no_overwrite_flag_survives() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster("whole-flags");

    cluster
        .source
        .attach_database(
            &DatabaseConfig::persistent(
                "guarded",
                BackendKind::LogStore,
                dir.path().join("guarded"),
            )
            .with_no_overwrite(),
        )
        .unwrap();
    let src_db = cluster.source_handle.open("guarded").unwrap();
    src_db.put(b"k", b"v1").unwrap();

    src_db
        .migrate_database(
            cluster.destination_handle.addr(),
            ProviderId::new(1),
            &dir.path().join("guarded-moved"),
            true,
        )
        .unwrap();

    let dst_db = cluster.destination_handle.open("guarded").unwrap();
    let err = dst_db.put(b"k", b"v2").unwrap_err();
    assert_eq!(err.status(), Status::KeyExists);
    assert_eq!(dst_db.get(b"k", 8).unwrap(), b"v1");
}

#[test]
fn in_memory_database_cannot_relocate() {
    let cluster = cluster("whole-mem");
    let src_db = crate::common::attach_map(&cluster.source, &cluster.source_handle, "mem");
    let err = src_db
        .migrate_database(
            cluster.destination_handle.addr(),
            ProviderId::new(1),
            std::path::Path::new("/tmp/never"),
            false,
        )
        .unwrap_err();
    assert_eq!(err.status(), Status::OpNotImpl);
}

#[test]
fn destination_name_collision_aborts_before_moving() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = cluster("whole-collision");

    cluster
        .source
        .attach_database(&DatabaseConfig::persistent(
            "taken",
            BackendKind::LogStore,
            dir.path().join("src"),
        ))
        .unwrap();
    let src_db = cluster.source_handle.open("taken").unwrap();
    src_db.put(b"k", b"v").unwrap();

    // Same name already lives on the destination.
    crate::common::attach_map(&cluster.destination, &cluster.destination_handle, "taken");

    let err = src_db
        .migrate_database(
            cluster.destination_handle.addr(),
            ProviderId::new(1),
            &dir.path().join("dst"),
            true,
        )
        .unwrap_err();
    assert_eq!(err.status(), Status::FileMove);

    // Nothing moved, nothing removed.
    assert_eq!(src_db.get(b"k", 8).unwrap(), b"v");
    assert!(!dir.path().join("dst").exists());
}
