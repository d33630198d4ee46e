//! Storage backends for keyfab
//!
//! This crate implements the pluggable storage contract behind every
//! database a provider hosts:
//! - [`Backend`]: the object-safe operation set the engine calls
//! - [`NullStore`]: discards writes; for benchmarking the layers above
//! - [`MapStore`]: in-memory ordered map with pluggable key comparators
//! - [`LogStore`]: persistent append-only record log with an in-memory
//!   ordered index rebuilt by replay
//! - [`BtreeStore`]: persistent B-tree store backed by `redb`
//!
//! Backends are handed to the engine as `Arc<dyn Backend>`; each owns its
//! interior locking and the engine adds no per-key guarantees on top.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod btree;
pub mod comparator;
pub mod fileset;
pub mod log;
pub mod map;
pub mod null;

pub use backend::{open_backend, Backend};
pub use btree::BtreeStore;
pub use comparator::{CompareFn, ComparatorRegistry, KeyComparator, OrderedKey};
pub use fileset::{
    Fileset, META_COMPARATOR, META_DATA_FILE, META_DB_NAME, META_DB_TYPE, META_NO_OVERWRITE,
};
pub use log::LogStore;
pub use map::MapStore;
pub use null::NullStore;
