//! Client-side handles for keyfab providers
//!
//! A [`Client`] wraps a fabric; [`ProviderHandle`] addresses one provider
//! on it and [`DatabaseHandle`] one database behind that provider. Handles
//! are shared-ownership values — clone them freely, the last clone
//! releases the underlying state.
//!
//! Every fallible operation returns a `Result`; non-success reply statuses
//! surface as typed errors, never as panics. Batch operations build their
//! packed regions here, so callers deal in slices and vectors only.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod database;
pub mod provider;

pub use database::{DatabaseHandle, PackedGet};
pub use provider::ProviderHandle;

use keyfab_core::{ProviderId, Result};
use keyfab_fabric::Fabric;

/// Entry point for client code.
#[derive(Clone)]
pub struct Client {
    fabric: Fabric,
}

impl Client {
    /// A client speaking over `fabric`.
    pub fn new(fabric: Fabric) -> Self {
        Client { fabric }
    }

    /// The fabric this client speaks over.
    pub fn fabric(&self) -> &Fabric {
        &self.fabric
    }

    /// Address a provider, verifying its endpoint exists.
    pub fn provider_handle(
        &self,
        addr: impl Into<String>,
        provider_id: ProviderId,
    ) -> Result<ProviderHandle> {
        let addr = addr.into();
        self.fabric.lookup(&addr)?;
        Ok(ProviderHandle::new(self.fabric.clone(), addr, provider_id))
    }

    /// Ask the endpoint at `addr` to finalize itself.
    ///
    /// Honored only by endpoints registered with remote shutdown enabled.
    pub fn shutdown_service(&self, addr: &str) -> Result<()> {
        self.fabric.shutdown(addr)
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client").finish()
    }
}
