//! Remote shutdown authorization and post-shutdown behavior.

use keyfab::{
    BackendKind, Client, DatabaseConfig, EndpointConfig, Fabric, Provider, ProviderConfig,
    ProviderId, Status,
};

fn node_with_shutdown(addr: &str, allow: bool) -> (Fabric, Client) {
    let fabric = Fabric::new();
    fabric
        .add_endpoint(
            addr,
            EndpointConfig {
                allow_remote_shutdown: allow,
                ..EndpointConfig::default()
            },
        )
        .unwrap();
    let provider = Provider::register(
        &fabric,
        addr,
        ProviderId::new(1),
        ProviderConfig::default(),
    )
    .unwrap();
    provider
        .attach_database(&DatabaseConfig::in_memory("data", BackendKind::Map))
        .unwrap();
    (fabric.clone(), Client::new(fabric))
}

#[test]
fn unauthorized_shutdown_is_refused() {
    let (fabric, client) = node_with_shutdown("locked", false);
    let err = client.shutdown_service("locked").unwrap_err();
    assert_eq!(err.status(), Status::Fabric);
    assert!(!fabric.is_finalized("locked"));

    // The provider still serves.
    let handle = client
        .provider_handle("locked", ProviderId::new(1))
        .unwrap();
    assert_eq!(handle.count_databases().unwrap(), 1);
}

#[test]
fn authorized_shutdown_finalizes_endpoint() {
    let (fabric, client) = node_with_shutdown("open", true);
    let handle = client.provider_handle("open", ProviderId::new(1)).unwrap();
    let db = handle.open("data").unwrap();
    db.put(b"k", b"v").unwrap();

    client.shutdown_service("open").unwrap();
    assert!(fabric.is_finalized("open"));

    // Every call after finalization fails at the transport.
    assert_eq!(db.put(b"x", b"y").unwrap_err().status(), Status::Fabric);
    assert_eq!(
        handle.count_databases().unwrap_err().status(),
        Status::Fabric
    );
    // Lookup of a finalized address fails too.
    assert!(client
        .provider_handle("open", ProviderId::new(1))
        .is_err());
}

#[test]
fn no_regions_leak_across_failures() {
    let (fabric, client) = node_with_shutdown("leaky", true);
    let handle = client.provider_handle("leaky", ProviderId::new(1)).unwrap();
    let db = handle.open("data").unwrap();

    client.shutdown_service("leaky").unwrap();
    // Batch calls fail after shutdown; their staged regions must still be
    // released on the error path.
    assert!(db.put_multi(&[(b"k".to_vec(), b"v".to_vec())]).is_err());
    assert!(db.get_multi(&[b"k".to_vec()], 8).is_err());
    assert!(db.length_packed(&[b"k".to_vec()]).is_err());
    assert_eq!(fabric.bulk_registered_count(), 0);
}
