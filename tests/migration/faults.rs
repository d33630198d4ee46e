//! Migration failure semantics: aborts are immediate, partial state
//! stands, resources are released.

use crate::common::{attach_map, cluster};
use keyfab::{BackendKind, DatabaseConfig, MigrationFlag, Status};

#[test]
fn destination_failure_leaves_partial_state() {
    let cluster = cluster("fault-partial");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");

    // The destination refuses overwrites and is pre-seeded with the third
    // key, so the third forward fails.
    cluster
        .destination
        .attach_database(
            &DatabaseConfig::in_memory("dst", BackendKind::Map).with_no_overwrite(),
        )
        .unwrap();
    let dst = cluster.destination_handle.open("dst").unwrap();
    dst.put(b"k3", b"already-here").unwrap();

    for key in [b"k1".as_slice(), b"k2", b"k3", b"k4", b"k5"] {
        src.put(key, b"migrated").unwrap();
    }

    let err = src
        .migrate_all_keys(&dst, MigrationFlag::RemoveOriginal)
        .unwrap_err();
    assert_eq!(err.status(), Status::Migration);

    // Keys forwarded before the failure are gone from the source and
    // present on the destination; nothing was rolled back.
    assert!(!src.exists(b"k1").unwrap());
    assert!(!src.exists(b"k2").unwrap());
    assert_eq!(dst.get(b"k1", 16).unwrap(), b"migrated");
    assert_eq!(dst.get(b"k2", 16).unwrap(), b"migrated");

    // The failing key and everything after it stay on the source; the
    // destination keeps its own value.
    assert!(src.exists(b"k3").unwrap());
    assert!(src.exists(b"k4").unwrap());
    assert!(src.exists(b"k5").unwrap());
    assert_eq!(dst.get(b"k3", 16).unwrap(), b"already-here");
}

#[test]
fn retry_after_partial_failure_converges() {
    let cluster = cluster("fault-retry");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    cluster
        .destination
        .attach_database(
            &DatabaseConfig::in_memory("dst", BackendKind::Map).with_no_overwrite(),
        )
        .unwrap();
    let dst = cluster.destination_handle.open("dst").unwrap();
    dst.put(b"k2", b"collision").unwrap();

    for key in [b"k1".as_slice(), b"k2", b"k3"] {
        src.put(key, b"v").unwrap();
    }
    let err = src
        .migrate_all_keys(&dst, MigrationFlag::RemoveOriginal)
        .unwrap_err();
    assert_eq!(err.status(), Status::Migration);

    // Clearing the collision and retrying moves the remainder.
    dst.erase(b"k2").unwrap();
    src.migrate_all_keys(&dst, MigrationFlag::RemoveOriginal)
        .unwrap();
    assert!(dst.exists(b"k1").unwrap());
    assert!(dst.exists(b"k2").unwrap());
    assert!(dst.exists(b"k3").unwrap());
    assert!(crate::common::all_keys(&src).is_empty());
}

#[test]
fn finalized_destination_fails_with_migration_status() {
    let cluster = cluster("fault-finalized");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");
    src.put(b"k", b"v").unwrap();

    cluster
        .fabric
        .finalize(cluster.destination_handle.addr())
        .unwrap();

    // The destination address no longer resolves, so the handlers fail
    // their address lookup before forwarding anything.
    let err = src
        .migrate_all_keys(&dst, MigrationFlag::KeepOriginal)
        .unwrap_err();
    assert_eq!(err.status(), Status::Fabric);
    let err = src
        .migrate_keys(&[b"k".to_vec()], &dst, MigrationFlag::RemoveOriginal)
        .unwrap_err();
    assert_eq!(err.status(), Status::Fabric);
    assert!(src.exists(b"k").unwrap());
}

#[test]
fn failed_migration_releases_bulk_regions() {
    let cluster = cluster("fault-leak");
    let src = attach_map(&cluster.source, &cluster.source_handle, "src");
    let dst = attach_map(&cluster.destination, &cluster.destination_handle, "dst");
    src.put(b"k", b"v").unwrap();
    cluster.destination.remove_database(dst.id()).unwrap();

    let _ = src
        .migrate_keys(&[b"k".to_vec()], &dst, MigrationFlag::RemoveOriginal)
        .unwrap_err();
    assert_eq!(cluster.fabric.bulk_registered_count(), 0);
}
