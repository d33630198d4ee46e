//! RPC fabric for keyfab
//!
//! The engine consumes the RPC runtime through the narrow surface this
//! crate defines: endpoint registration, provider handler installation,
//! address lookup, bulk-buffer registration and transfer, calls, and
//! remote shutdown.
//!
//! The implementation here is an in-process mesh: endpoints are rows in a
//! shared table, calls serialize their envelope and run the target
//! provider's handler on that endpoint's worker pool, and bulk buffers are
//! registered memory regions addressed by opaque ids. It backs the test
//! suites and single-host deployments; the surface is what the engine
//! relies on, not the transport behind it.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bulk;
pub mod mesh;
pub mod message;

pub use bulk::{BulkAccess, BulkHandle, BulkRef};
pub use mesh::{EndpointConfig, Fabric, Handler};
pub use message::{DbEntry, Request, Response};
