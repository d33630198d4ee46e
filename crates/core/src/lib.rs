//! Core types for keyfab
//!
//! This crate holds everything the other layers agree on:
//! - The wire status taxonomy and the internal error type
//! - Provider / database identifiers and attach-time configuration
//! - The packed-buffer codec used by multi and packed data-plane operations
//!
//! Nothing here touches storage or the fabric; upper crates depend on this
//! one and never the other way around.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod packed;
pub mod types;

pub use error::{Error, Result, Status};
pub use types::{
    BackendKind, DatabaseConfig, DatabaseId, MigrationFlag, ProviderConfig, ProviderId,
};
