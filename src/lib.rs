//! keyfab — distributed key-value storage providers over an RPC fabric.
//!
//! A process hosts one or more [`Provider`]s on a fabric endpoint; each
//! provider multiplexes named databases over pluggable storage backends.
//! Clients address an operation by `(address, provider id, database id)`
//! through [`Client`] handles. Live migration moves key ranges, prefixes,
//! explicit sets, or whole databases between providers while the source
//! keeps serving.
//!
//! The facade re-exports the public surface of the member crates; see the
//! crate-level docs of each for the details.

pub use keyfab_core::{
    packed, BackendKind, DatabaseConfig, DatabaseId, Error, MigrationFlag, ProviderConfig,
    ProviderId, Result, Status,
};

pub use keyfab_storage::{
    open_backend, Backend, BtreeStore, CompareFn, ComparatorRegistry, Fileset, KeyComparator,
    LogStore, MapStore, NullStore,
};

pub use keyfab_fabric::{
    BulkAccess, BulkHandle, BulkRef, DbEntry, EndpointConfig, Fabric, Request, Response,
};

pub use keyfab_engine::{
    DatabaseRegistry, FileMover, LocalMover, Provider, MIGRATION_BATCH,
};

pub use keyfab_client::{Client, DatabaseHandle, PackedGet, ProviderHandle};
