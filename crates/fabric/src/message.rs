//! Request and response envelopes.
//!
//! Envelopes cross the fabric bincode-serialized. Small payloads (single
//! keys, eager values) travel inline; batch payloads travel as [`BulkRef`]s
//! into registered regions laid out per the packed-buffer codec.

use crate::bulk::BulkRef;
use keyfab_core::{DatabaseId, MigrationFlag, Status};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One `(name, id)` row of a database listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbEntry {
    /// Database name
    pub name: String,
    /// Database id on the serving provider
    pub id: DatabaseId,
}

/// Request envelope, one variant per registered operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Request {
    /// Resolve a database name to its id
    Open {
        /// Database name
        name: String,
    },
    /// Number of databases on the provider
    CountDatabases,
    /// Up to `max` `(name, id)` rows in registry insertion order
    ListDatabases {
        /// Row cap
        max: u64,
    },

    /// Store one pair, eager payload
    Put {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
        /// Value bytes
        value: Vec<u8>,
    },
    /// Fetch one value, eager reply bounded by `vsize`
    Get {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
        /// Caller's value buffer capacity
        vsize: u64,
    },
    /// Byte length of one value
    Length {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
    },
    /// Key presence test
    Exists {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
    },
    /// Remove one key
    Erase {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
    },

    /// Store one pair whose value travels by bulk transfer
    BulkPut {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
        /// Region holding the value
        value_bulk: BulkRef,
        /// Value size within the region
        vsize: u64,
    },
    /// Fetch one value into a caller region
    BulkGet {
        /// Target database
        db: DatabaseId,
        /// Key bytes
        key: Vec<u8>,
        /// Region the value is pushed into
        value_bulk: BulkRef,
        /// Usable capacity of the region
        capacity: u64,
    },

    /// Store `count` pairs from two segment buffers
    PutMulti {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
        /// Values region: sizes then packed values
        vals_bulk: BulkRef,
    },
    /// Fetch `count` values into a caller region with per-entry capacities
    GetMulti {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
        /// Values region: capacities on entry, sizes + packed values on
        /// return
        vals_bulk: BulkRef,
    },
    /// Per-entry value lengths for `count` keys
    LengthMulti {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
        /// Region receiving `count` u64 lengths
        sizes_bulk: BulkRef,
    },
    /// Presence bitmask for `count` keys
    ExistsMulti {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
        /// Region receiving ⌈count/8⌉ flag bytes
        flags_bulk: BulkRef,
    },
    /// Erase `count` keys; absent keys are skipped
    EraseMulti {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
    },

    /// Store `count` pairs from one packed region
    PutPacked {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Packed region: key sizes, value sizes, keys, values
        bulk: BulkRef,
        /// Address owning the region when it is not the caller's
        /// (proxy writes)
        origin: Option<String>,
    },
    /// Fetch `count` values into one packed region with a cumulative cap
    GetPacked {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
        /// Region receiving sizes then packed values, cumulative capacity
        vals_bulk: BulkRef,
    },
    /// Per-entry value lengths written back into the request region
    LengthPacked {
        /// Target database
        db: DatabaseId,
        /// Batch size
        count: u64,
        /// Read-write region: sizes + packed keys in, lengths out
        bulk: BulkRef,
    },

    /// Stream keys after `start` matching `prefix`
    ListKeys {
        /// Target database
        db: DatabaseId,
        /// Exclusive start key; empty lists from the beginning
        start: Vec<u8>,
        /// Raw-byte prefix filter
        prefix: Vec<u8>,
        /// Slot count
        max: u64,
        /// Read-write region of `max` u64 slot capacities; true sizes on
        /// return
        ksizes_bulk: BulkRef,
        /// Region receiving key bytes, segmented at the capacities
        keys_bulk: BulkRef,
    },
    /// Stream key/value pairs after `start` matching `prefix`
    ListKeyvals {
        /// Target database
        db: DatabaseId,
        /// Exclusive start key; empty lists from the beginning
        start: Vec<u8>,
        /// Raw-byte prefix filter
        prefix: Vec<u8>,
        /// Slot count
        max: u64,
        /// Read-write region of key slot capacities; true sizes on return
        ksizes_bulk: BulkRef,
        /// Region receiving key bytes
        keys_bulk: BulkRef,
        /// Read-write region of value slot capacities; true sizes on return
        vsizes_bulk: BulkRef,
        /// Region receiving value bytes
        vals_bulk: BulkRef,
    },

    /// Forward the listed keys to another provider
    MigrateKeys {
        /// Source database on the serving provider
        source_db: DatabaseId,
        /// Destination endpoint address
        target_addr: String,
        /// Destination provider id
        target_provider: u16,
        /// Destination database id
        target_db: DatabaseId,
        /// Key count
        count: u64,
        /// Keys region: sizes then packed keys
        keys_bulk: BulkRef,
        /// Keep or remove source keys
        flag: MigrationFlag,
    },
    /// Forward every key in the open interval `(lower, upper)`
    MigrateKeyRange {
        /// Source database on the serving provider
        source_db: DatabaseId,
        /// Destination endpoint address
        target_addr: String,
        /// Destination provider id
        target_provider: u16,
        /// Destination database id
        target_db: DatabaseId,
        /// Exclusive lower bound
        lower: Vec<u8>,
        /// Exclusive upper bound
        upper: Vec<u8>,
        /// Keep or remove source keys
        flag: MigrationFlag,
    },
    /// Forward every key matching a byte prefix
    MigrateKeysPrefixed {
        /// Source database on the serving provider
        source_db: DatabaseId,
        /// Destination endpoint address
        target_addr: String,
        /// Destination provider id
        target_provider: u16,
        /// Destination database id
        target_db: DatabaseId,
        /// Raw-byte prefix
        prefix: Vec<u8>,
        /// Keep or remove source keys
        flag: MigrationFlag,
    },
    /// Forward every key in the database
    MigrateAllKeys {
        /// Source database on the serving provider
        source_db: DatabaseId,
        /// Destination endpoint address
        target_addr: String,
        /// Destination provider id
        target_provider: u16,
        /// Destination database id
        target_db: DatabaseId,
        /// Keep or remove source keys
        flag: MigrationFlag,
    },

    /// Relocate a whole database, files included
    MigrateDatabase {
        /// Source database on the serving provider
        source_db: DatabaseId,
        /// Destination endpoint address
        dest_addr: String,
        /// Destination provider id
        dest_provider: u16,
        /// Directory on the destination for the moved files
        dest_root: PathBuf,
        /// Remove the source database after a successful move
        remove_src: bool,
    },
    /// Destination-side validation before files move
    RelocationValidate {
        /// Fileset metadata
        metadata: BTreeMap<String, String>,
        /// Destination root the files will land in
        root: PathBuf,
    },
    /// Destination-side attach after files moved
    RelocationInstall {
        /// Fileset metadata
        metadata: BTreeMap<String, String>,
        /// Destination root the files landed in
        root: PathBuf,
    },

    /// On-disk size of a database's fileset
    DatabaseSize {
        /// Target database
        db: DatabaseId,
    },

    /// Finalize the endpoint; privileged
    Shutdown,
}

/// Response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// Status-only completion
    Status(Status),
    /// Reply to [`Request::Open`]
    Open {
        /// Completion status
        status: Status,
        /// Resolved id, invalid unless success
        db: DatabaseId,
    },
    /// Reply to [`Request::CountDatabases`]
    Count {
        /// Completion status
        status: Status,
        /// Database count
        count: u64,
    },
    /// Reply to [`Request::ListDatabases`]
    DbList {
        /// Completion status
        status: Status,
        /// `(name, id)` rows in registry insertion order
        entries: Vec<DbEntry>,
    },
    /// Reply to [`Request::Get`]
    Get {
        /// Completion status; `Size` reports `vsize` without a payload
        status: Status,
        /// Actual value size
        vsize: u64,
        /// Value bytes, empty unless success
        value: Vec<u8>,
    },
    /// Reply to [`Request::Length`]
    Length {
        /// Completion status
        status: Status,
        /// Value size in bytes
        size: u64,
    },
    /// Reply to [`Request::Exists`]
    Exists {
        /// Completion status
        status: Status,
        /// Presence flag
        exists: bool,
    },
    /// Reply to [`Request::BulkGet`]
    BulkGet {
        /// Completion status; `Size` reports `vsize` without a transfer
        status: Status,
        /// Actual value size
        vsize: u64,
    },
    /// Reply to the listing operations
    ListCount {
        /// Completion status
        status: Status,
        /// Entries matched (also set alongside `Size`)
        count: u64,
    },
    /// Reply to [`Request::DatabaseSize`]
    DbSize {
        /// Completion status
        status: Status,
        /// Total fileset bytes
        size: u64,
    },
    /// Reply to [`Request::RelocationValidate`]
    Validate {
        /// Zero accepts the fileset; negative values reject it
        status: i32,
    },
    /// Reply to [`Request::RelocationInstall`]
    Install {
        /// Completion status
        status: Status,
        /// Fresh id of the attached database
        db: DatabaseId,
    },
}

impl Response {
    /// The completion status carried by any response shape.
    pub fn status(&self) -> Status {
        match self {
            Response::Status(status) => *status,
            Response::Open { status, .. } => *status,
            Response::Count { status, .. } => *status,
            Response::DbList { status, .. } => *status,
            Response::Get { status, .. } => *status,
            Response::Length { status, .. } => *status,
            Response::Exists { status, .. } => *status,
            Response::BulkGet { status, .. } => *status,
            Response::ListCount { status, .. } => *status,
            Response::DbSize { status, .. } => *status,
            Response::Validate { status } => {
                if *status == 0 {
                    Status::Success
                } else {
                    Status::FileMove
                }
            }
            Response::Install { status, .. } => *status,
        }
    }
}
