//! Shared fixtures: a fabric with one provider and a client on top.

use keyfab::{
    BackendKind, Client, DatabaseConfig, DatabaseHandle, EndpointConfig, Fabric, Provider,
    ProviderConfig, ProviderHandle, ProviderId,
};
use std::sync::Arc;

pub struct TestNode {
    pub fabric: Fabric,
    pub provider: Arc<Provider>,
    pub handle: ProviderHandle,
}

fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

/// One endpoint, one provider, one client handle.
pub fn test_node(addr: &str) -> TestNode {
    init_tracing();
    let fabric = Fabric::new();
    let config = ProviderConfig::default();
    fabric
        .add_endpoint(addr, EndpointConfig::from(&config))
        .unwrap();
    let provider = Provider::register(&fabric, addr, ProviderId::new(1), config).unwrap();
    let handle = Client::new(fabric.clone())
        .provider_handle(addr, ProviderId::new(1))
        .unwrap();
    TestNode {
        fabric,
        provider,
        handle,
    }
}

/// Attach an in-memory map database and open a client handle on it.
pub fn attach_and_open(node: &TestNode, name: &str) -> DatabaseHandle {
    node.provider
        .attach_database(&DatabaseConfig::in_memory(name, BackendKind::Map))
        .unwrap();
    node.handle.open(name).unwrap()
}
