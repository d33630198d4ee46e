//! Registered memory regions for zero-copy-style payload transfer.
//!
//! A caller exposes a byte region and passes the resulting [`BulkRef`] in
//! its request; the serving side pulls from or pushes into the region
//! through the fabric. Registrations are scarce fabric resources: the
//! owning [`BulkHandle`] deregisters on drop, on every exit path.

use dashmap::DashMap;
use keyfab_core::{Error, Result};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What the origin allows remote peers to do with a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkAccess {
    /// Peers may pull (origin is the data source)
    ReadOnly,
    /// Peers may push (origin is the data sink)
    WriteOnly,
    /// Peers may pull and push
    ReadWrite,
}

impl BulkAccess {
    fn allows_pull(self) -> bool {
        matches!(self, BulkAccess::ReadOnly | BulkAccess::ReadWrite)
    }

    fn allows_push(self) -> bool {
        matches!(self, BulkAccess::WriteOnly | BulkAccess::ReadWrite)
    }
}

struct Region {
    data: Arc<RwLock<Vec<u8>>>,
    access: BulkAccess,
}

/// Serializable reference to a registered region; this is what travels in
/// request envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkRef {
    /// Registration id
    pub id: u64,
    /// Region size in bytes
    pub size: u64,
}

/// Table of registered regions for one fabric.
#[derive(Default)]
pub struct BulkRegistry {
    regions: DashMap<u64, Region>,
    next_id: AtomicU64,
}

impl BulkRegistry {
    pub(crate) fn new() -> Self {
        BulkRegistry {
            regions: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn register(registry: &Arc<Self>, data: Vec<u8>, access: BulkAccess) -> BulkHandle {
        let id = registry.next_id.fetch_add(1, Ordering::Relaxed);
        let size = data.len() as u64;
        let data = Arc::new(RwLock::new(data));
        registry.regions.insert(
            id,
            Region {
                data: data.clone(),
                access,
            },
        );
        BulkHandle {
            id,
            size,
            data,
            registry: Arc::downgrade(registry),
        }
    }

    /// Number of live registrations; the leak detector tests use this.
    pub fn registered_count(&self) -> usize {
        self.regions.len()
    }

    pub(crate) fn pull(&self, bulk: &BulkRef, offset: u64, len: u64) -> Result<Vec<u8>> {
        let region = self
            .regions
            .get(&bulk.id)
            .ok_or_else(|| Error::Fabric(format!("bulk region {} not registered", bulk.id)))?;
        if !region.access.allows_pull() {
            return Err(Error::Fabric(format!(
                "bulk region {} does not allow pull",
                bulk.id
            )));
        }
        let data = region.data.read();
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= data.len() as u64)
            .ok_or_else(|| {
                Error::Fabric(format!(
                    "pull of {} bytes at {} exceeds region of {}",
                    len,
                    offset,
                    data.len()
                ))
            })?;
        Ok(data[offset as usize..end as usize].to_vec())
    }

    pub(crate) fn push(&self, bulk: &BulkRef, offset: u64, bytes: &[u8]) -> Result<()> {
        let region = self
            .regions
            .get(&bulk.id)
            .ok_or_else(|| Error::Fabric(format!("bulk region {} not registered", bulk.id)))?;
        if !region.access.allows_push() {
            return Err(Error::Fabric(format!(
                "bulk region {} does not allow push",
                bulk.id
            )));
        }
        let mut data = region.data.write();
        let end = offset
            .checked_add(bytes.len() as u64)
            .filter(|&end| end <= data.len() as u64)
            .ok_or_else(|| {
                Error::Fabric(format!(
                    "push of {} bytes at {} exceeds region of {}",
                    bytes.len(),
                    offset,
                    data.len()
                ))
            })?;
        data[offset as usize..end as usize].copy_from_slice(bytes);
        Ok(())
    }

    fn deregister(&self, id: u64) {
        self.regions.remove(&id);
    }
}

/// Owned registration of a bulk region.
///
/// Deregisters on drop. The owner keeps direct access to the bytes so it
/// can read what a peer pushed after the call returns.
pub struct BulkHandle {
    id: u64,
    size: u64,
    data: Arc<RwLock<Vec<u8>>>,
    registry: std::sync::Weak<BulkRegistry>,
}

impl BulkHandle {
    /// The wire reference peers use to address this region.
    pub fn bulk_ref(&self) -> BulkRef {
        BulkRef {
            id: self.id,
            size: self.size,
        }
    }

    /// Region size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Copy the current region contents out.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().clone()
    }

    /// Read the region through a borrowed view.
    pub fn with<T>(&self, f: impl FnOnce(&[u8]) -> T) -> T {
        f(&self.data.read())
    }
}

impl Drop for BulkHandle {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.deregister(self.id);
        }
    }
}

impl std::fmt::Debug for BulkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BulkHandle")
            .field("id", &self.id)
            .field("size", &self.size)
            .finish()
    }
}
