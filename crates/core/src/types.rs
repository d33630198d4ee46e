//! Identifiers and configuration shared across the workspace.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Opaque handle for a database within one provider.
///
/// Stable for the database's lifetime on that provider and never reused by
/// it; migrating a database to another provider yields a fresh id there.
/// Zero is reserved as the invalid id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DatabaseId(u64);

impl DatabaseId {
    /// The reserved invalid id.
    pub const INVALID: DatabaseId = DatabaseId(0);

    /// Build an id from its raw wire representation.
    pub const fn from_raw(raw: u64) -> Self {
        DatabaseId(raw)
    }

    /// Raw wire representation.
    pub const fn as_raw(self) -> u64 {
        self.0
    }

    /// True unless this is the reserved invalid id.
    pub fn is_valid(self) -> bool {
        self.0 != 0
    }
}

impl fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies a provider on an endpoint.
///
/// Several providers may share one endpoint address; the pair
/// `(address, provider id)` is the unit of RPC dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderId(u16);

impl ProviderId {
    /// Build a provider id.
    pub const fn new(id: u16) -> Self {
        ProviderId(id)
    }

    /// Raw value.
    pub const fn get(self) -> u16 {
        self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which backend implementation a database uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackendKind {
    /// Discards writes, reports every key absent; for benchmarking the
    /// engine and fabric layers
    Null,
    /// In-memory ordered map
    Map,
    /// Persistent append-only log with an in-memory ordered index
    LogStore,
    /// Persistent B-tree store
    BtreeStore,
}

impl BackendKind {
    /// Canonical token used in fileset metadata and configuration files.
    pub const fn as_str(self) -> &'static str {
        match self {
            BackendKind::Null => "null",
            BackendKind::Map => "map",
            BackendKind::LogStore => "log_store",
            BackendKind::BtreeStore => "btree_store",
        }
    }

    /// True for backends whose contents survive a restart (and which can
    /// therefore be relocated as filesets).
    pub const fn is_persistent(self) -> bool {
        matches!(self, BackendKind::LogStore | BackendKind::BtreeStore)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = UnknownBackendKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "null" => Ok(BackendKind::Null),
            "map" => Ok(BackendKind::Map),
            "log_store" => Ok(BackendKind::LogStore),
            "btree_store" => Ok(BackendKind::BtreeStore),
            _ => Err(UnknownBackendKind(s.to_string())),
        }
    }
}

/// Parse error for [`BackendKind`] tokens.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown backend kind: {0:?}")]
pub struct UnknownBackendKind(pub String);

/// Attach-time configuration for one database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database name, unique within the provider
    pub name: String,
    /// Backend-specific storage root; ignored by in-memory backends
    pub path: PathBuf,
    /// Backend implementation to open
    pub kind: BackendKind,
    /// Named comparator to order keys with; `None` means lexicographic
    /// byte order
    pub comparator: Option<String>,
    /// Reject puts whose key already exists
    pub no_overwrite: bool,
}

impl DatabaseConfig {
    /// Configuration for an in-memory database of the given kind.
    pub fn in_memory(name: impl Into<String>, kind: BackendKind) -> Self {
        DatabaseConfig {
            name: name.into(),
            path: PathBuf::new(),
            kind,
            comparator: None,
            no_overwrite: false,
        }
    }

    /// Configuration for a persistent database rooted at `path`.
    pub fn persistent(name: impl Into<String>, kind: BackendKind, path: impl Into<PathBuf>) -> Self {
        DatabaseConfig {
            name: name.into(),
            path: path.into(),
            kind,
            comparator: None,
            no_overwrite: false,
        }
    }

    /// Order keys with the named registered comparator.
    pub fn with_comparator(mut self, name: impl Into<String>) -> Self {
        self.comparator = Some(name.into());
        self
    }

    /// Fail puts that would overwrite an existing key.
    pub fn with_no_overwrite(mut self) -> Self {
        self.no_overwrite = true;
        self
    }
}

/// Per-provider runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Number of workers the endpoint dedicates to this provider's
    /// handlers
    pub handler_pool_size: usize,
    /// Run a progress thread even when no handler is resident
    pub progress_thread_enabled: bool,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            handler_pool_size: 4,
            progress_thread_enabled: false,
        }
    }
}

/// What migration does with source keys after a successful transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationFlag {
    /// Leave the source keys in place
    KeepOriginal,
    /// Erase each source key once its destination put succeeded
    RemoveOriginal,
}
