//! Packed-operation handlers: sizes and payloads in a single bulk region.
//!
//! `put_packed` may name a third-party origin for its region, so a proxy
//! can stage data on one node and have another node's provider pull it.
//! `get_packed` budgets one cumulative capacity across the batch: the
//! first value that does not fit zeroes its size and every later one,
//! and the reply status is `Size`; values packed before the overflow are
//! still delivered.

use crate::provider::Provider;
use keyfab_core::packed;
use keyfab_core::{DatabaseId, Error, Result, Status};
use keyfab_fabric::{BulkRef, Response};

impl Provider {
    pub(crate) fn op_put_packed(
        &self,
        db: DatabaseId,
        count: u64,
        bulk: &BulkRef,
        origin: Option<&str>,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        // A third-party origin must at least be a live address.
        if let Some(addr) = origin {
            self.fabric().lookup(addr)?;
        }

        let buf = self.fabric().bulk_pull(bulk, 0, bulk.size)?;
        let pairs = packed::decode_pairs(&buf, count)?;
        backend.put_multi(&pairs)
    }

    pub(crate) fn op_get_packed(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        vals_bulk: &BulkRef,
    ) -> Response {
        match self.get_packed_inner(db, count, keys_bulk, vals_bulk) {
            Ok(status) => Response::Status(status),
            Err(e) => Response::Status(e.status()),
        }
    }

    fn get_packed_inner(
        &self,
        db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        vals_bulk: &BulkRef,
    ) -> Result<Status> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let keys_buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let keys = packed::decode_segments(&keys_buf, count)?;

        let sizes_len = packed::sizes_region(count) as u64;
        if vals_bulk.size < sizes_len {
            return Err(Error::InvalidArg(format!(
                "value region of {} bytes cannot hold {} sizes",
                vals_bulk.size, count
            )));
        }
        let mut remaining = vals_bulk.size - sizes_len;
        let mut status = Status::Success;
        let mut sizes = vec![0u64; count];
        let mut values = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            if remaining == 0 && status == Status::Size {
                continue; // sizes[i] stays 0 for everything past the overflow
            }
            match backend.get(key) {
                Ok(value) => {
                    if value.len() as u64 > remaining {
                        status = Status::Size;
                        remaining = 0;
                    } else {
                        remaining -= value.len() as u64;
                        sizes[i] = value.len() as u64;
                        values.extend_from_slice(&value);
                    }
                }
                Err(_) => {} // absent entries report zero
            }
        }

        let mut out = vec![0u8; packed::sizes_region(count)];
        packed::write_sizes(&mut out, &sizes)?;
        out.extend_from_slice(&values);
        self.fabric().bulk_push(vals_bulk, 0, &out)?;
        Ok(status)
    }

    pub(crate) fn op_length_packed(
        &self,
        db: DatabaseId,
        count: u64,
        bulk: &BulkRef,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let buf = self.fabric().bulk_pull(bulk, 0, bulk.size)?;
        let keys = packed::decode_segments(&buf, count)?;

        let sizes: Vec<u64> = keys
            .iter()
            .map(|key| backend.length(key).unwrap_or(0))
            .collect();
        // Lengths go back into the sizes region of the same buffer.
        let mut out = vec![0u8; packed::sizes_region(count)];
        packed::write_sizes(&mut out, &sizes)?;
        self.fabric().bulk_push(bulk, 0, &out)
    }
}
