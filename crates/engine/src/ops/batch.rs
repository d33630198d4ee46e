//! Multi-operation handlers: N items across two bulk regions.
//!
//! Per-entry failures in the get/length shapes are encoded as zero sizes
//! in the returned sizes array; the operation itself completes `Success`.
//! This privileges batch throughput over per-entry signaling — callers
//! that must distinguish "absent" from "empty" probe individually.

use crate::provider::Provider;
use keyfab_core::packed;
use keyfab_core::{DatabaseId, Error, Result};
use keyfab_fabric::BulkRef;

impl Provider {
    pub(crate) fn op_put_multi(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        vals_bulk: &BulkRef,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let keys_buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let vals_buf = self.fabric().bulk_pull(vals_bulk, 0, vals_bulk.size)?;
        let keys = packed::decode_segments(&keys_buf, count)?;
        let vals = packed::decode_segments(&vals_buf, count)?;

        let items: Vec<(Vec<u8>, Vec<u8>)> = keys.into_iter().zip(vals).collect();
        backend.put_multi(&items)
    }

    pub(crate) fn op_get_multi(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        vals_bulk: &BulkRef,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let keys_buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let keys = packed::decode_segments(&keys_buf, count)?;

        // The front of the caller's value region carries its per-entry
        // capacities.
        let caps_buf = self
            .fabric()
            .bulk_pull(vals_bulk, 0, packed::sizes_region(count) as u64)?;
        let caps = packed::read_sizes(&caps_buf, count)?;

        let mut sizes = vec![0u64; count];
        let mut values = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            if let Ok(value) = backend.get(key) {
                // An entry larger than its capacity is reported as zero,
                // like an absent one.
                if value.len() as u64 <= caps[i] {
                    sizes[i] = value.len() as u64;
                    values.extend_from_slice(&value);
                }
            }
        }

        let mut out = vec![0u8; packed::sizes_region(count)];
        packed::write_sizes(&mut out, &sizes)?;
        out.extend_from_slice(&values);
        self.fabric().bulk_push(vals_bulk, 0, &out)
    }

    pub(crate) fn op_length_multi(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        sizes_bulk: &BulkRef,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let keys_buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let keys = packed::decode_segments(&keys_buf, count)?;

        let sizes: Vec<u64> = keys
            .iter()
            .map(|key| backend.length(key).unwrap_or(0))
            .collect();
        let mut out = vec![0u8; packed::sizes_region(count)];
        packed::write_sizes(&mut out, &sizes)?;
        self.fabric().bulk_push(sizes_bulk, 0, &out)
    }

    pub(crate) fn op_exists_multi(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        flags_bulk: &BulkRef,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let keys_buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let keys = packed::decode_segments(&keys_buf, count)?;

        // One bit per key, LSB-first within each byte.
        let mut flags = vec![0u8; (count + 7) / 8];
        for (i, key) in keys.iter().enumerate() {
            if backend.exists(key).unwrap_or(false) {
                flags[i / 8] |= 1 << (i % 8);
            }
        }
        self.fabric().bulk_push(flags_bulk, 0, &flags)
    }

    pub(crate) fn op_erase_multi(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let keys_buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let keys = packed::decode_segments(&keys_buf, count)?;

        for key in &keys {
            // Absent keys are skipped; the batch shape has no per-entry
            // erase signal.
            let _ = backend.erase(key);
        }
        Ok(())
    }
}
