//! Fixture: one fabric carrying a source and a destination provider.

use keyfab::{
    BackendKind, Client, DatabaseConfig, DatabaseHandle, EndpointConfig, Fabric, LocalMover,
    Provider, ProviderConfig, ProviderHandle, ProviderId,
};
use std::sync::Arc;

pub const SRC: &str = "src-node";
pub const DST: &str = "dst-node";

pub struct Cluster {
    pub fabric: Fabric,
    pub source: Arc<Provider>,
    pub destination: Arc<Provider>,
    pub source_handle: ProviderHandle,
    pub destination_handle: ProviderHandle,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// Two endpoints, one provider on each, movers installed on both sides.
pub fn cluster(tag: &str) -> Cluster {
    init_tracing();
    let fabric = Fabric::new();
    let src_addr = format!("{}-{}", SRC, tag);
    let dst_addr = format!("{}-{}", DST, tag);
    fabric
        .add_endpoint(&src_addr, EndpointConfig::default())
        .unwrap();
    fabric
        .add_endpoint(&dst_addr, EndpointConfig::default())
        .unwrap();

    let source = Provider::register(
        &fabric,
        &src_addr,
        ProviderId::new(1),
        ProviderConfig::default(),
    )
    .unwrap();
    let destination = Provider::register(
        &fabric,
        &dst_addr,
        ProviderId::new(1),
        ProviderConfig::default(),
    )
    .unwrap();
    source.set_relocation_mover(Arc::new(LocalMover::new(fabric.clone())));
    destination.set_relocation_mover(Arc::new(LocalMover::new(fabric.clone())));

    let client = Client::new(fabric.clone());
    let source_handle = client
        .provider_handle(&src_addr, ProviderId::new(1))
        .unwrap();
    let destination_handle = client
        .provider_handle(&dst_addr, ProviderId::new(1))
        .unwrap();
    Cluster {
        fabric,
        source,
        destination,
        source_handle,
        destination_handle,
    }
}

/// Attach an in-memory map database on `provider` and open it through
/// `handle`.
pub fn attach_map(
    provider: &Arc<Provider>,
    handle: &ProviderHandle,
    name: &str,
) -> DatabaseHandle {
    provider
        .attach_database(&DatabaseConfig::in_memory(name, BackendKind::Map))
        .unwrap();
    handle.open(name).unwrap()
}

/// Every key currently readable in `db`, listed through the client.
pub fn all_keys(db: &DatabaseHandle) -> Vec<Vec<u8>> {
    db.list_keys(b"", b"", 1024, 64).unwrap()
}
