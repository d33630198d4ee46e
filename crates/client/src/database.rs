//! Handle to one database behind a provider.
//!
//! Batch methods build the packed regions the wire contract describes,
//! register them with scoped ownership (dropped on every exit path), and
//! carve replies back into vectors. Methods that can legitimately deliver
//! partial results under a `Size` condition say so explicitly.

use crate::provider::ProviderHandle;
use keyfab_core::packed;
use keyfab_core::{DatabaseId, Error, MigrationFlag, Result, Status};
use keyfab_fabric::{BulkAccess, Request, Response};
use std::path::Path;

/// Result of a `get_packed`: values delivered before any overflow, plus
/// the status that tells the caller whether the batch was cut short.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedGet {
    /// `Success`, or `Size` when the cumulative capacity ran out
    pub status: Status,
    /// Per-key values; empty for absent keys and for everything after an
    /// overflow
    pub values: Vec<Vec<u8>>,
}

/// Shared-ownership handle to one database.
#[derive(Clone)]
pub struct DatabaseHandle {
    provider: ProviderHandle,
    id: DatabaseId,
}

impl DatabaseHandle {
    pub(crate) fn new(provider: ProviderHandle, id: DatabaseId) -> Self {
        DatabaseHandle { provider, id }
    }

    /// The database id on its provider.
    pub fn id(&self) -> DatabaseId {
        self.id
    }

    /// The provider this database lives on.
    pub fn provider(&self) -> &ProviderHandle {
        &self.provider
    }

    fn expect_status(&self, request: &Request) -> Result<()> {
        self.provider.call(request)?.status().into_result()
    }

    /// Store `value` under `key`.
    pub fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.expect_status(&Request::Put {
            db: self.id,
            key: key.to_vec(),
            value: value.to_vec(),
        })
    }

    /// Fetch the value under `key`, declaring a receive capacity.
    ///
    /// A stored value larger than `max_size` fails with the `Size` error
    /// carrying the size actually needed; nothing is truncated.
    pub fn get(&self, key: &[u8], max_size: u64) -> Result<Vec<u8>> {
        match self.provider.call(&Request::Get {
            db: self.id,
            key: key.to_vec(),
            vsize: max_size,
        })? {
            Response::Get { status, value, .. } if status.is_success() => Ok(value),
            Response::Get {
                status: Status::Size,
                vsize,
                ..
            } => Err(Error::Size {
                needed: vsize,
                capacity: max_size,
            }),
            response => Err(Error::Remote(response.status())),
        }
    }

    /// Byte length of the value under `key`.
    pub fn length(&self, key: &[u8]) -> Result<u64> {
        match self.provider.call(&Request::Length {
            db: self.id,
            key: key.to_vec(),
        })? {
            Response::Length { status, size } if status.is_success() => Ok(size),
            response => Err(Error::Remote(response.status())),
        }
    }

    /// Whether `key` is present.
    pub fn exists(&self, key: &[u8]) -> Result<bool> {
        match self.provider.call(&Request::Exists {
            db: self.id,
            key: key.to_vec(),
        })? {
            Response::Exists { status, exists } if status.is_success() => Ok(exists),
            response => Err(Error::Remote(response.status())),
        }
    }

    /// Remove `key`.
    pub fn erase(&self, key: &[u8]) -> Result<()> {
        self.expect_status(&Request::Erase {
            db: self.id,
            key: key.to_vec(),
        })
    }

    /// Store one pair, moving the value by bulk transfer.
    pub fn bulk_put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let region = self
            .provider
            .fabric()
            .expose(value.to_vec(), BulkAccess::ReadOnly);
        self.expect_status(&Request::BulkPut {
            db: self.id,
            key: key.to_vec(),
            value_bulk: region.bulk_ref(),
            vsize: region.size(),
        })
    }

    /// Fetch one value by bulk transfer into a buffer of `capacity` bytes.
    pub fn bulk_get(&self, key: &[u8], capacity: u64) -> Result<Vec<u8>> {
        let region = self
            .provider
            .fabric()
            .expose(vec![0u8; capacity as usize], BulkAccess::WriteOnly);
        match self.provider.call(&Request::BulkGet {
            db: self.id,
            key: key.to_vec(),
            value_bulk: region.bulk_ref(),
            capacity,
        })? {
            Response::BulkGet { status, vsize } if status.is_success() => {
                let mut value = region.snapshot();
                value.truncate(vsize as usize);
                Ok(value)
            }
            Response::BulkGet {
                status: Status::Size,
                vsize,
            } => Err(Error::Size {
                needed: vsize,
                capacity,
            }),
            response => Err(Error::Remote(response.status())),
        }
    }

    /// Store a batch of pairs over two bulk regions.
    pub fn put_multi(&self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let keys: Vec<&[u8]> = pairs.iter().map(|(k, _)| k.as_slice()).collect();
        let vals: Vec<&[u8]> = pairs.iter().map(|(_, v)| v.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&keys), BulkAccess::ReadOnly);
        let vals_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&vals), BulkAccess::ReadOnly);
        self.expect_status(&Request::PutMulti {
            db: self.id,
            count: pairs.len() as u64,
            keys_bulk: keys_region.bulk_ref(),
            vals_bulk: vals_region.bulk_ref(),
        })
    }

    /// Fetch a batch of values, each with capacity `per_entry_capacity`.
    ///
    /// Entries that are absent or larger than the capacity come back
    /// empty; the batch itself still succeeds.
    pub fn get_multi(&self, keys: &[Vec<u8>], per_entry_capacity: u64) -> Result<Vec<Vec<u8>>> {
        let count = keys.len();
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadOnly);

        let mut vals_buf =
            vec![0u8; packed::sizes_region(count) + count * per_entry_capacity as usize];
        packed::write_sizes(&mut vals_buf, &vec![per_entry_capacity; count])?;
        let vals_region = self
            .provider
            .fabric()
            .expose(vals_buf, BulkAccess::ReadWrite);

        self.expect_status(&Request::GetMulti {
            db: self.id,
            count: count as u64,
            keys_bulk: keys_region.bulk_ref(),
            vals_bulk: vals_region.bulk_ref(),
        })?;

        let reply = vals_region.snapshot();
        let sizes = packed::read_sizes(&reply, count)?;
        let mut offset = packed::sizes_region(count);
        let mut values = Vec::with_capacity(count);
        for size in sizes {
            let end = offset + size as usize;
            if end > reply.len() {
                return Err(Error::InvalidArg("reply shorter than its sizes".into()));
            }
            values.push(reply[offset..end].to_vec());
            offset = end;
        }
        Ok(values)
    }

    /// Per-entry value lengths; zero for absent keys.
    pub fn length_multi(&self, keys: &[Vec<u8>]) -> Result<Vec<u64>> {
        let count = keys.len();
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadOnly);
        let sizes_region = self
            .provider
            .fabric()
            .expose(vec![0u8; packed::sizes_region(count)], BulkAccess::WriteOnly);

        self.expect_status(&Request::LengthMulti {
            db: self.id,
            count: count as u64,
            keys_bulk: keys_region.bulk_ref(),
            sizes_bulk: sizes_region.bulk_ref(),
        })?;
        packed::read_sizes(&sizes_region.snapshot(), count)
    }

    /// Per-entry presence flags.
    pub fn exists_multi(&self, keys: &[Vec<u8>]) -> Result<Vec<bool>> {
        let count = keys.len();
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadOnly);
        let flags_region = self
            .provider
            .fabric()
            .expose(vec![0u8; (count + 7) / 8], BulkAccess::WriteOnly);

        self.expect_status(&Request::ExistsMulti {
            db: self.id,
            count: count as u64,
            keys_bulk: keys_region.bulk_ref(),
            flags_bulk: flags_region.bulk_ref(),
        })?;

        let flags = flags_region.snapshot();
        Ok((0..count).map(|i| flags[i / 8] & (1 << (i % 8)) != 0).collect())
    }

    /// Erase a batch of keys; absent ones are skipped.
    pub fn erase_multi(&self, keys: &[Vec<u8>]) -> Result<()> {
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadOnly);
        self.expect_status(&Request::EraseMulti {
            db: self.id,
            count: keys.len() as u64,
            keys_bulk: keys_region.bulk_ref(),
        })
    }

    /// Store a batch of pairs in a single packed region.
    pub fn put_packed(&self, pairs: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        let region = self
            .provider
            .fabric()
            .expose(packed::encode_pairs(pairs), BulkAccess::ReadOnly);
        self.expect_status(&Request::PutPacked {
            db: self.id,
            count: pairs.len() as u64,
            bulk: region.bulk_ref(),
            origin: None,
        })
    }

    /// Fetch a batch of values under one cumulative capacity.
    ///
    /// On overflow the reply status is `Size` and values past the first
    /// offender are empty; everything packed before it is delivered.
    pub fn get_packed(&self, keys: &[Vec<u8>], capacity: u64) -> Result<PackedGet> {
        let count = keys.len();
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadOnly);
        let vals_region = self.provider.fabric().expose(
            vec![0u8; packed::sizes_region(count) + capacity as usize],
            BulkAccess::ReadWrite,
        );

        let status = self
            .provider
            .call(&Request::GetPacked {
                db: self.id,
                count: count as u64,
                keys_bulk: keys_region.bulk_ref(),
                vals_bulk: vals_region.bulk_ref(),
            })?
            .status();
        if !matches!(status, Status::Success | Status::Size) {
            return Err(Error::Remote(status));
        }

        let reply = vals_region.snapshot();
        let sizes = packed::read_sizes(&reply, count)?;
        let mut offset = packed::sizes_region(count);
        let mut values = Vec::with_capacity(count);
        for size in sizes {
            let end = offset + size as usize;
            if end > reply.len() {
                return Err(Error::InvalidArg("reply shorter than its sizes".into()));
            }
            values.push(reply[offset..end].to_vec());
            offset = end;
        }
        Ok(PackedGet { status, values })
    }

    /// Per-entry value lengths through the single-region packed shape.
    pub fn length_packed(&self, keys: &[Vec<u8>]) -> Result<Vec<u64>> {
        let count = keys.len();
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadWrite);
        self.expect_status(&Request::LengthPacked {
            db: self.id,
            count: count as u64,
            bulk: region.bulk_ref(),
        })?;
        packed::read_sizes(&region.snapshot(), count)
    }

    /// List keys after `start` matching `prefix`, one capacity per slot.
    ///
    /// On a `Size` reply the true sizes are written back into `caps` so
    /// the caller can re-issue with room; the error status is preserved.
    pub fn try_list_keys(
        &self,
        start: &[u8],
        prefix: &[u8],
        caps: &mut [u64],
    ) -> Result<Vec<Vec<u8>>> {
        let max = caps.len();
        let mut caps_buf = vec![0u8; packed::sizes_region(max)];
        packed::write_sizes(&mut caps_buf, caps)?;
        let ksizes_region = self
            .provider
            .fabric()
            .expose(caps_buf, BulkAccess::ReadWrite);
        let total: u64 = caps.iter().sum();
        let keys_region = self
            .provider
            .fabric()
            .expose(vec![0u8; total as usize], BulkAccess::WriteOnly);

        let response = self.provider.call(&Request::ListKeys {
            db: self.id,
            start: start.to_vec(),
            prefix: prefix.to_vec(),
            max: max as u64,
            ksizes_bulk: ksizes_region.bulk_ref(),
            keys_bulk: keys_region.bulk_ref(),
        })?;
        let (status, count) = match response {
            Response::ListCount { status, count } => (status, count as usize),
            other => return Err(Error::Fabric(format!("unexpected response: {:?}", other))),
        };

        let sizes = packed::read_sizes(&ksizes_region.snapshot(), max)?;
        match status {
            Status::Success => {
                let buf = keys_region.snapshot();
                let mut keys = Vec::with_capacity(count);
                let mut offset = 0usize;
                for i in 0..count {
                    keys.push(buf[offset..offset + sizes[i] as usize].to_vec());
                    offset += caps[i] as usize;
                }
                Ok(keys)
            }
            Status::Size => {
                caps.copy_from_slice(&sizes);
                Err(Error::Remote(Status::Size))
            }
            other => Err(Error::Remote(other)),
        }
    }

    /// List keys with a uniform slot capacity, retrying once with the true
    /// sizes when the first attempt reports `Size`.
    pub fn list_keys(
        &self,
        start: &[u8],
        prefix: &[u8],
        max: usize,
        key_capacity: u64,
    ) -> Result<Vec<Vec<u8>>> {
        let mut caps = vec![key_capacity; max];
        match self.try_list_keys(start, prefix, &mut caps) {
            Ok(keys) => Ok(keys),
            Err(e) if e.status() == Status::Size => self.try_list_keys(start, prefix, &mut caps),
            Err(e) => Err(e),
        }
    }

    /// List key/value pairs after `start` matching `prefix`.
    ///
    /// Same inout-capacity contract as [`Self::try_list_keys`], applied to
    /// both slot arrays.
    pub fn try_list_keyvals(
        &self,
        start: &[u8],
        prefix: &[u8],
        kcaps: &mut [u64],
        vcaps: &mut [u64],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if kcaps.len() != vcaps.len() {
            return Err(Error::InvalidArg(
                "key and value slot arrays differ in length".into(),
            ));
        }
        let max = kcaps.len();

        let mut buf = vec![0u8; packed::sizes_region(max)];
        packed::write_sizes(&mut buf, kcaps)?;
        let ksizes_region = self.provider.fabric().expose(buf, BulkAccess::ReadWrite);
        let mut buf = vec![0u8; packed::sizes_region(max)];
        packed::write_sizes(&mut buf, vcaps)?;
        let vsizes_region = self.provider.fabric().expose(buf, BulkAccess::ReadWrite);

        let ktotal: u64 = kcaps.iter().sum();
        let vtotal: u64 = vcaps.iter().sum();
        let keys_region = self
            .provider
            .fabric()
            .expose(vec![0u8; ktotal as usize], BulkAccess::WriteOnly);
        let vals_region = self
            .provider
            .fabric()
            .expose(vec![0u8; vtotal as usize], BulkAccess::WriteOnly);

        let response = self.provider.call(&Request::ListKeyvals {
            db: self.id,
            start: start.to_vec(),
            prefix: prefix.to_vec(),
            max: max as u64,
            ksizes_bulk: ksizes_region.bulk_ref(),
            keys_bulk: keys_region.bulk_ref(),
            vsizes_bulk: vsizes_region.bulk_ref(),
            vals_bulk: vals_region.bulk_ref(),
        })?;
        let (status, count) = match response {
            Response::ListCount { status, count } => (status, count as usize),
            other => return Err(Error::Fabric(format!("unexpected response: {:?}", other))),
        };

        let ksizes = packed::read_sizes(&ksizes_region.snapshot(), max)?;
        let vsizes = packed::read_sizes(&vsizes_region.snapshot(), max)?;
        match status {
            Status::Success => {
                let kbuf = keys_region.snapshot();
                let vbuf = vals_region.snapshot();
                let mut pairs = Vec::with_capacity(count);
                let (mut koff, mut voff) = (0usize, 0usize);
                for i in 0..count {
                    let key = kbuf[koff..koff + ksizes[i] as usize].to_vec();
                    let value = vbuf[voff..voff + vsizes[i] as usize].to_vec();
                    pairs.push((key, value));
                    koff += kcaps[i] as usize;
                    voff += vcaps[i] as usize;
                }
                Ok(pairs)
            }
            Status::Size => {
                kcaps.copy_from_slice(&ksizes);
                vcaps.copy_from_slice(&vsizes);
                Err(Error::Remote(Status::Size))
            }
            other => Err(Error::Remote(other)),
        }
    }

    /// List key/value pairs with uniform capacities, retrying once on
    /// `Size`.
    pub fn list_keyvals(
        &self,
        start: &[u8],
        prefix: &[u8],
        max: usize,
        key_capacity: u64,
        value_capacity: u64,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut kcaps = vec![key_capacity; max];
        let mut vcaps = vec![value_capacity; max];
        match self.try_list_keyvals(start, prefix, &mut kcaps, &mut vcaps) {
            Ok(pairs) => Ok(pairs),
            Err(e) if e.status() == Status::Size => {
                self.try_list_keyvals(start, prefix, &mut kcaps, &mut vcaps)
            }
            Err(e) => Err(e),
        }
    }

    /// Migrate an explicit key set to `dest`.
    pub fn migrate_keys(
        &self,
        keys: &[Vec<u8>],
        dest: &DatabaseHandle,
        flag: MigrationFlag,
    ) -> Result<()> {
        let key_slices: Vec<&[u8]> = keys.iter().map(|k| k.as_slice()).collect();
        let keys_region = self
            .provider
            .fabric()
            .expose(packed::encode_segments(&key_slices), BulkAccess::ReadOnly);
        self.expect_status(&Request::MigrateKeys {
            source_db: self.id,
            target_addr: dest.provider.addr().to_string(),
            target_provider: dest.provider.provider_id().get(),
            target_db: dest.id,
            count: keys.len() as u64,
            keys_bulk: keys_region.bulk_ref(),
            flag,
        })
    }

    /// Migrate every key in the open interval `(lower, upper)` to `dest`.
    pub fn migrate_key_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        dest: &DatabaseHandle,
        flag: MigrationFlag,
    ) -> Result<()> {
        self.expect_status(&Request::MigrateKeyRange {
            source_db: self.id,
            target_addr: dest.provider.addr().to_string(),
            target_provider: dest.provider.provider_id().get(),
            target_db: dest.id,
            lower: lower.to_vec(),
            upper: upper.to_vec(),
            flag,
        })
    }

    /// Migrate every key matching `prefix` to `dest`.
    pub fn migrate_keys_prefixed(
        &self,
        prefix: &[u8],
        dest: &DatabaseHandle,
        flag: MigrationFlag,
    ) -> Result<()> {
        self.expect_status(&Request::MigrateKeysPrefixed {
            source_db: self.id,
            target_addr: dest.provider.addr().to_string(),
            target_provider: dest.provider.provider_id().get(),
            target_db: dest.id,
            prefix: prefix.to_vec(),
            flag,
        })
    }

    /// Migrate every key to `dest`.
    pub fn migrate_all_keys(&self, dest: &DatabaseHandle, flag: MigrationFlag) -> Result<()> {
        self.expect_status(&Request::MigrateAllKeys {
            source_db: self.id,
            target_addr: dest.provider.addr().to_string(),
            target_provider: dest.provider.provider_id().get(),
            target_db: dest.id,
            flag,
        })
    }

    /// Relocate this database, files included, to another provider.
    pub fn migrate_database(
        &self,
        dest_addr: &str,
        dest_provider: keyfab_core::ProviderId,
        dest_root: &Path,
        remove_src: bool,
    ) -> Result<()> {
        self.expect_status(&Request::MigrateDatabase {
            source_db: self.id,
            dest_addr: dest_addr.to_string(),
            dest_provider: dest_provider.get(),
            dest_root: dest_root.to_path_buf(),
            remove_src,
        })
    }

    /// On-disk size of this database's fileset.
    pub fn database_size(&self) -> Result<u64> {
        match self.provider.call(&Request::DatabaseSize { db: self.id })? {
            Response::DbSize { status, size } if status.is_success() => Ok(size),
            response => Err(Error::Remote(response.status())),
        }
    }
}

impl std::fmt::Debug for DatabaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseHandle")
            .field("provider", &self.provider)
            .field("id", &self.id)
            .finish()
    }
}
