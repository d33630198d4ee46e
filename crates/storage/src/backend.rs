//! The storage contract every backend satisfies.
//!
//! The engine holds backends as `Arc<dyn Backend>` and is uniform in their
//! identity — no handler is specialized on a concrete store. Methods are
//! synchronous; a backend that blocks does so on its own locks and files.

use crate::btree::BtreeStore;
use crate::comparator::KeyComparator;
use crate::fileset::Fileset;
use crate::log::LogStore;
use crate::map::MapStore;
use crate::null::NullStore;
use keyfab_core::{BackendKind, DatabaseConfig, Error, Result};
use std::path::Path;
use std::sync::Arc;

/// Operation set of one database's storage.
///
/// # Ordering contract
///
/// Listing operations enumerate keys in the total order of the comparator
/// bound at open time. The start key is strictly excluded; an empty start
/// key means "from the beginning". Prefixes filter on raw bytes, not on
/// comparator order.
pub trait Backend: Send + Sync {
    /// Database name this backend was opened under.
    fn name(&self) -> &str;

    /// Which implementation this is.
    fn kind(&self) -> BackendKind;

    /// Storage root; empty for in-memory backends.
    fn path(&self) -> &Path;

    /// Name of the bound comparator, absent for the lexicographic default.
    fn comparator_name(&self) -> Option<&str>;

    /// True when puts refuse to overwrite existing keys.
    fn no_overwrite(&self) -> bool;

    /// Store `value` under `key`.
    ///
    /// Fails with `KeyExists` when the key is present and the database was
    /// opened no-overwrite; `Put` on a backend write failure.
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Store a batch of pairs.
    ///
    /// The first failing item short-circuits the batch; items before it
    /// stay written. The error reported is the first failure's.
    fn put_multi(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        for (key, value) in items {
            self.put(key, value)?;
        }
        Ok(())
    }

    /// Fetch the value stored under `key`, or `UnknownKey`.
    fn get(&self, key: &[u8]) -> Result<Vec<u8>>;

    /// Byte length of the value stored under `key`, or `UnknownKey`.
    fn length(&self, key: &[u8]) -> Result<u64> {
        Ok(self.get(key)?.len() as u64)
    }

    /// True if `key` is present.
    fn exists(&self, key: &[u8]) -> Result<bool>;

    /// Remove `key`. Fails with `Erase` when absent.
    fn erase(&self, key: &[u8]) -> Result<()>;

    /// Keys after `start` (exclusive) matching `prefix`, at most `max`.
    fn list_keys(&self, start: &[u8], prefix: &[u8], max: usize) -> Result<Vec<Vec<u8>>>;

    /// Key/value pairs after `start` (exclusive) matching `prefix`, at most
    /// `max`.
    fn list_keyvals(&self, start: &[u8], prefix: &[u8], max: usize)
        -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Key/value pairs in the open interval `(lower, upper)`, at most
    /// `max`; `max == 0` means unbounded.
    fn list_range(&self, lower: &[u8], upper: &[u8], max: usize)
        -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Flush buffered writes to stable storage.
    fn sync(&self) -> Result<()>;

    /// Describe this database's on-disk files for relocation.
    ///
    /// Returns `None` for backends with nothing on disk.
    fn create_fileset(&self) -> Result<Option<Fileset>>;
}

/// Open the backend a configuration names.
///
/// The comparator must already be resolved by the caller (the provider's
/// registry does this so an unknown name fails the attach, not the open).
/// `BtreeStore` cannot re-order its tree under a custom comparator and
/// refuses one with `CompFunc`.
pub fn open_backend(config: &DatabaseConfig, comparator: KeyComparator) -> Result<Arc<dyn Backend>> {
    match config.kind {
        BackendKind::Null => Ok(Arc::new(NullStore::open(config))),
        BackendKind::Map => Ok(Arc::new(MapStore::open(config, comparator))),
        BackendKind::LogStore => Ok(Arc::new(LogStore::open(config, comparator)?)),
        BackendKind::BtreeStore => {
            if !comparator.is_default() {
                return Err(Error::CompFunc(
                    comparator.name().unwrap_or_default().to_string(),
                ));
            }
            Ok(Arc::new(BtreeStore::open(config)?))
        }
    }
}
