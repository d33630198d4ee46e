//! Error types and the wire status taxonomy
//!
//! Two layers live here and they serve different callers:
//!
//! - [`Status`] is the wire contract: a small integer every RPC reply
//!   carries, with a fixed message per code. Codes are frozen — clients on
//!   other hosts decode them numerically.
//! - [`Error`] is the internal error type. It carries context (which key,
//!   which size, which backend message) and collapses to a `Status` at the
//!   RPC boundary via [`Error::status`].
//!
//! Handlers never panic on a recoverable condition; they propagate `Error`
//! with `?` and the dispatch layer turns it into a status reply.

use crate::types::DatabaseId;
use serde::{Deserialize, Serialize};
use std::io;
use thiserror::Error;

/// Result type alias for keyfab operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wire-visible completion status.
///
/// The numeric codes and messages are part of the RPC contract and must not
/// be renumbered. `Success` is `0`; everything else is negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Normal completion
    Success,
    /// Host memory exhaustion
    Allocation,
    /// Malformed request
    InvalidArg,
    /// Underlying RPC transport failure
    Fabric,
    /// Backend open/create failed
    DbCreate,
    /// Database name unknown or already taken
    DbName,
    /// Database id unknown
    UnknownDb,
    /// Provider id not registered on the endpoint
    UnknownProvider,
    /// Backend put failed
    Put,
    /// Key absent
    UnknownKey,
    /// Caller's buffer too small
    Size,
    /// Key absent or backend erase failed
    Erase,
    /// Migration step failed
    Migration,
    /// Backend does not implement this operation
    OpNotImpl,
    /// Comparator name unknown or already registered
    CompFunc,
    /// External file-mover failed
    FileMove,
    /// Task/scheduling error
    Task,
    /// Put would overwrite and no-overwrite is set
    KeyExists,
}

impl Status {
    /// Numeric wire code for this status.
    pub const fn code(self) -> i32 {
        match self {
            Status::Success => 0,
            Status::Allocation => -1,
            Status::InvalidArg => -2,
            Status::Fabric => -3,
            Status::DbCreate => -4,
            Status::DbName => -5,
            Status::UnknownDb => -6,
            Status::UnknownProvider => -7,
            Status::Put => -8,
            Status::UnknownKey => -9,
            Status::Size => -10,
            Status::Erase => -11,
            Status::Migration => -12,
            Status::OpNotImpl => -13,
            Status::CompFunc => -14,
            Status::FileMove => -15,
            Status::Task => -16,
            Status::KeyExists => -17,
        }
    }

    /// Decode a numeric wire code.
    pub fn from_code(code: i32) -> Option<Status> {
        Some(match code {
            0 => Status::Success,
            -1 => Status::Allocation,
            -2 => Status::InvalidArg,
            -3 => Status::Fabric,
            -4 => Status::DbCreate,
            -5 => Status::DbName,
            -6 => Status::UnknownDb,
            -7 => Status::UnknownProvider,
            -8 => Status::Put,
            -9 => Status::UnknownKey,
            -10 => Status::Size,
            -11 => Status::Erase,
            -12 => Status::Migration,
            -13 => Status::OpNotImpl,
            -14 => Status::CompFunc,
            -15 => Status::FileMove,
            -16 => Status::Task,
            -17 => Status::KeyExists,
            _ => return None,
        })
    }

    /// Wire-visible message for this status.
    ///
    /// The success message is the empty string, matching the convention that
    /// only failures have something to say.
    pub const fn message(self) -> &'static str {
        match self {
            Status::Success => "",
            Status::Allocation => "Allocation error",
            Status::InvalidArg => "Invalid argument",
            Status::Fabric => "Fabric error",
            Status::DbCreate => "Could not create database",
            Status::DbName => "Invalid database name",
            Status::UnknownDb => "Invalid database id",
            Status::UnknownProvider => "Invalid provider id",
            Status::Put => "Error writing in the database",
            Status::UnknownKey => "Unknown key",
            Status::Size => "Provided buffer size too small",
            Status::Erase => "Error erasing from the database",
            Status::Migration => "Migration error",
            Status::OpNotImpl => "Function not implemented",
            Status::CompFunc => "Invalid comparison function",
            Status::FileMove => "File-move error",
            Status::Task => "Task error",
            Status::KeyExists => "Key exists",
        }
    }

    /// True for `Success`.
    pub fn is_success(self) -> bool {
        matches!(self, Status::Success)
    }

    /// Map to `Ok(())` on success, `Err(Error::Remote(self))` otherwise.
    ///
    /// Used by the client layer so callers get a `Result` instead of
    /// inspecting raw statuses.
    pub fn into_result(self) -> Result<()> {
        if self.is_success() {
            Ok(())
        } else {
            Err(Error::Remote(self))
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Error type for keyfab operations.
///
/// Variants map one-to-one onto the wire statuses but carry the context a
/// log line or a caller needs. Conversion to the wire form is lossy by
/// design — only the status crosses the network.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed request (bad sizes array, truncated packed buffer, ...)
    #[error("invalid argument: {0}")]
    InvalidArg(String),

    /// RPC transport failure
    #[error("fabric error: {0}")]
    Fabric(String),

    /// Backend open/create failed
    #[error("could not create database: {0}")]
    DbCreate(String),

    /// Database name unknown or already registered
    #[error("invalid database name: {0:?}")]
    DbName(String),

    /// Database id unknown to the provider
    #[error("invalid database id: {0}")]
    UnknownDb(DatabaseId),

    /// Provider id not registered on the target endpoint
    #[error("invalid provider id: {0}")]
    UnknownProvider(u16),

    /// Backend rejected a put
    #[error("error writing in the database: {0}")]
    Put(String),

    /// Key absent
    #[error("unknown key")]
    UnknownKey,

    /// Caller's buffer cannot hold the value
    #[error("provided buffer size too small: need {needed}, have {capacity}")]
    Size {
        /// Bytes actually required
        needed: u64,
        /// Bytes the caller allocated
        capacity: u64,
    },

    /// Key absent or backend erase failed
    #[error("error erasing from the database")]
    Erase,

    /// A migration step failed; partial state may remain
    #[error("migration error: {0}")]
    Migration(String),

    /// Backend does not implement the requested operation
    #[error("function not implemented")]
    OpNotImpl,

    /// Comparator name unknown (at attach) or already registered
    #[error("invalid comparison function: {0:?}")]
    CompFunc(String),

    /// External file-mover failed; carries the mover's status when it
    /// reported one
    #[error("file-move error (status {status})")]
    FileMove {
        /// Mover-reported status, negative on destination-side rejection
        status: i32,
    },

    /// Task/scheduling error
    #[error("task error: {0}")]
    Task(String),

    /// Put would overwrite an existing key under no-overwrite
    #[error("key exists")]
    KeyExists,

    /// A remote peer answered with a non-success status
    #[error("remote error: {}", .0.message())]
    Remote(Status),

    /// I/O error from a persistent backend or the file mover
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// The wire status this error collapses to at the RPC boundary.
    pub fn status(&self) -> Status {
        match self {
            Error::InvalidArg(_) => Status::InvalidArg,
            Error::Fabric(_) => Status::Fabric,
            Error::DbCreate(_) => Status::DbCreate,
            Error::DbName(_) => Status::DbName,
            Error::UnknownDb(_) => Status::UnknownDb,
            Error::UnknownProvider(_) => Status::UnknownProvider,
            Error::Put(_) => Status::Put,
            Error::UnknownKey => Status::UnknownKey,
            Error::Size { .. } => Status::Size,
            Error::Erase => Status::Erase,
            Error::Migration(_) => Status::Migration,
            Error::OpNotImpl => Status::OpNotImpl,
            Error::CompFunc(_) => Status::CompFunc,
            Error::FileMove { .. } => Status::FileMove,
            Error::Task(_) => Status::Task,
            Error::KeyExists => Status::KeyExists,
            Error::Remote(status) => *status,
            // An I/O failure surfacing mid-operation is a backend write
            // problem from the caller's point of view.
            Error::Io(_) => Status::Put,
        }
    }
}
