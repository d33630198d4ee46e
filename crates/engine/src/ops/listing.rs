//! Listing handlers: stream keys (and values) into segmented regions.
//!
//! The caller supplies one capacity slot per entry; entry `i`'s bytes land
//! at the sum of the capacities before it, so the caller can carve its
//! region back up without guessing. When any entry exceeds its slot the
//! handler pushes the true sizes back and replies `Size` — the caller
//! re-issues with larger slots. Pagination is by re-issuing with `start`
//! set to the last key received.

use crate::provider::Provider;
use keyfab_core::packed;
use keyfab_core::{DatabaseId, Error, Result, Status};
use keyfab_fabric::{BulkRef, Response};

/// Push `segments` into `region`, entry `i` at offset `sum(caps[..i])`.
fn push_segmented(
    provider: &Provider,
    region: &BulkRef,
    caps: &[u64],
    segments: &[Vec<u8>],
) -> Result<()> {
    let mut offset = 0u64;
    for (segment, cap) in segments.iter().zip(caps) {
        if !segment.is_empty() {
            provider.fabric().bulk_push(region, offset, segment)?;
        }
        offset += cap;
    }
    Ok(())
}

impl Provider {
    pub(crate) fn op_list_keys(
        &self,
        db: DatabaseId,
        start: &[u8],
        prefix: &[u8],
        max: u64,
        ksizes_bulk: &BulkRef,
        keys_bulk: &BulkRef,
    ) -> Response {
        match self.list_keys_inner(db, start, prefix, max, ksizes_bulk, keys_bulk) {
            Ok((status, count)) => Response::ListCount { status, count },
            Err(e) => Response::ListCount {
                status: e.status(),
                count: 0,
            },
        }
    }

    fn list_keys_inner(
        &self,
        db: DatabaseId,
        start: &[u8],
        prefix: &[u8],
        max: u64,
        ksizes_bulk: &BulkRef,
        keys_bulk: &BulkRef,
    ) -> Result<(Status, u64)> {
        let max = usize::try_from(max).map_err(|_| Error::InvalidArg("max".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let caps_buf = self
            .fabric()
            .bulk_pull(ksizes_bulk, 0, packed::sizes_region(max) as u64)?;
        let caps = packed::read_sizes(&caps_buf, max)?;

        let mut keys = backend.list_keys(start, prefix, max)?;
        // The slot accounting below is sized by `max`; a backend result
        // must never exceed it.
        keys.truncate(max);
        if keys.is_empty() {
            return Ok((Status::Success, 0));
        }

        let mut sizes = vec![0u64; max];
        let mut size_error = false;
        for (i, key) in keys.iter().enumerate() {
            sizes[i] = key.len() as u64;
            if key.len() as u64 > caps[i] {
                size_error = true;
            }
        }

        // True sizes go back first so the caller can right-size a retry.
        let mut sizes_out = vec![0u8; packed::sizes_region(max)];
        packed::write_sizes(&mut sizes_out, &sizes)?;
        self.fabric().bulk_push(ksizes_bulk, 0, &sizes_out)?;

        if size_error {
            return Ok((Status::Size, keys.len() as u64));
        }

        push_segmented(self, keys_bulk, &caps, &keys)?;
        Ok((Status::Success, keys.len() as u64))
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_list_keyvals(
        &self,
        db: DatabaseId,
        start: &[u8],
        prefix: &[u8],
        max: u64,
        ksizes_bulk: &BulkRef,
        keys_bulk: &BulkRef,
        vsizes_bulk: &BulkRef,
        vals_bulk: &BulkRef,
    ) -> Response {
        match self.list_keyvals_inner(
            db,
            start,
            prefix,
            max,
            ksizes_bulk,
            keys_bulk,
            vsizes_bulk,
            vals_bulk,
        ) {
            Ok((status, count)) => Response::ListCount { status, count },
            Err(e) => Response::ListCount {
                status: e.status(),
                count: 0,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn list_keyvals_inner(
        &self,
        db: DatabaseId,
        start: &[u8],
        prefix: &[u8],
        max: u64,
        ksizes_bulk: &BulkRef,
        keys_bulk: &BulkRef,
        vsizes_bulk: &BulkRef,
        vals_bulk: &BulkRef,
    ) -> Result<(Status, u64)> {
        let max = usize::try_from(max).map_err(|_| Error::InvalidArg("max".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(db)?;

        let kcaps_buf = self
            .fabric()
            .bulk_pull(ksizes_bulk, 0, packed::sizes_region(max) as u64)?;
        let kcaps = packed::read_sizes(&kcaps_buf, max)?;
        let vcaps_buf = self
            .fabric()
            .bulk_pull(vsizes_bulk, 0, packed::sizes_region(max) as u64)?;
        let vcaps = packed::read_sizes(&vcaps_buf, max)?;

        let mut pairs = backend.list_keyvals(start, prefix, max)?;
        // The slot accounting below is sized by `max`; a backend result
        // must never exceed it.
        pairs.truncate(max);
        if pairs.is_empty() {
            return Ok((Status::Success, 0));
        }

        let mut ksizes = vec![0u64; max];
        let mut vsizes = vec![0u64; max];
        let mut size_error = false;
        for (i, (key, value)) in pairs.iter().enumerate() {
            ksizes[i] = key.len() as u64;
            vsizes[i] = value.len() as u64;
            if key.len() as u64 > kcaps[i] || value.len() as u64 > vcaps[i] {
                size_error = true;
            }
        }

        let mut sizes_out = vec![0u8; packed::sizes_region(max)];
        packed::write_sizes(&mut sizes_out, &ksizes)?;
        self.fabric().bulk_push(ksizes_bulk, 0, &sizes_out)?;
        packed::write_sizes(&mut sizes_out, &vsizes)?;
        self.fabric().bulk_push(vsizes_bulk, 0, &sizes_out)?;

        if size_error {
            return Ok((Status::Size, pairs.len() as u64));
        }

        let keys: Vec<Vec<u8>> = pairs.iter().map(|(k, _)| k.clone()).collect();
        let values: Vec<Vec<u8>> = pairs.into_iter().map(|(_, v)| v).collect();
        push_segmented(self, keys_bulk, &kcaps, &keys)?;
        push_segmented(self, vals_bulk, &vcaps, &values)?;
        Ok((Status::Success, keys.len() as u64))
    }
}
