//! Live key migration between providers.
//!
//! Every migration handler runs on the *source* provider, which turns
//! into a client of the destination: it resolves keys locally and forwards
//! each one as an ordinary `put` over the fabric, erasing behind itself
//! when `RemoveOriginal` is set.
//!
//! The source holds only its provider read lock, so migration interleaves
//! with concurrent reads and writes; keys inserted behind the walk cursor
//! may or may not be picked up. A failed forward aborts with `Migration`
//! and rolls nothing back — keys already forwarded (and, under
//! `RemoveOriginal`, already erased) stay where they landed. Retries must
//! tolerate that partial state.

use crate::provider::Provider;
use keyfab_core::packed;
use keyfab_core::{DatabaseId, Error, MigrationFlag, Result};
use keyfab_fabric::{BulkRef, Request};
use keyfab_storage::Backend;
use tracing::{debug, info};

/// Keys forwarded per listing round by the walking migrations.
pub const MIGRATION_BATCH: usize = 64;

/// Which keys a walking migration covers.
enum Scope {
    All,
    Prefix(Vec<u8>),
    Range { lower: Vec<u8>, upper: Vec<u8> },
}

impl Provider {
    /// Forward one key/value pair to the destination database.
    fn forward_pair(
        &self,
        target_addr: &str,
        target_provider: u16,
        target_db: DatabaseId,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<()> {
        let request = Request::Put {
            db: target_db,
            key: key.to_vec(),
            value,
        };
        let response = self
            .fabric()
            .call(target_addr, target_provider, &request)
            .map_err(|e| Error::Migration(format!("forward to {:?}: {}", target_addr, e)))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Migration(format!(
                "destination put returned {:?}",
                status
            )));
        }
        Ok(())
    }

    pub(crate) fn op_migrate_keys(
        &self,
        source_db: DatabaseId,
        target_addr: &str,
        target_provider: u16,
        target_db: DatabaseId,
        count: u64,
        keys_bulk: &BulkRef,
        flag: MigrationFlag,
    ) -> Result<()> {
        let count = usize::try_from(count).map_err(|_| Error::InvalidArg("count".into()))?;
        let registry = self.registry.read();
        let backend = registry.get(source_db)?;
        self.fabric().lookup(target_addr)?;

        let buf = self.fabric().bulk_pull(keys_bulk, 0, keys_bulk.size)?;
        let keys = packed::decode_segments(&buf, count)?;
        info!(
            %source_db,
            target = target_addr,
            count,
            "migrating explicit key set"
        );

        for key in &keys {
            let value = match backend.get(key) {
                Ok(value) => value,
                // A key the caller named but the source no longer holds is
                // skipped, not an error.
                Err(Error::UnknownKey) => continue,
                Err(e) => return Err(Error::Migration(e.to_string())),
            };
            self.forward_pair(target_addr, target_provider, target_db, key, value)?;
            if flag == MigrationFlag::RemoveOriginal {
                let _ = backend.erase(key);
            }
        }
        Ok(())
    }

    pub(crate) fn op_migrate_keys_prefixed(
        &self,
        source_db: DatabaseId,
        target_addr: &str,
        target_provider: u16,
        target_db: DatabaseId,
        prefix: &[u8],
        flag: MigrationFlag,
    ) -> Result<()> {
        self.migrate_walk(
            source_db,
            target_addr,
            target_provider,
            target_db,
            Scope::Prefix(prefix.to_vec()),
            flag,
        )
    }

    pub(crate) fn op_migrate_all_keys(
        &self,
        source_db: DatabaseId,
        target_addr: &str,
        target_provider: u16,
        target_db: DatabaseId,
        flag: MigrationFlag,
    ) -> Result<()> {
        self.migrate_walk(
            source_db,
            target_addr,
            target_provider,
            target_db,
            Scope::All,
            flag,
        )
    }

    pub(crate) fn op_migrate_key_range(
        &self,
        source_db: DatabaseId,
        target_addr: &str,
        target_provider: u16,
        target_db: DatabaseId,
        lower: &[u8],
        upper: &[u8],
        flag: MigrationFlag,
    ) -> Result<()> {
        self.migrate_walk(
            source_db,
            target_addr,
            target_provider,
            target_db,
            Scope::Range {
                lower: lower.to_vec(),
                upper: upper.to_vec(),
            },
            flag,
        )
    }

    /// Walk the scope in fixed-size batches, forwarding each pair.
    ///
    /// With `KeepOriginal` the cursor advances to the last key of each
    /// batch; with `RemoveOriginal` it stays put, because erased keys no
    /// longer appear at the front of the listing.
    fn migrate_walk(
        &self,
        source_db: DatabaseId,
        target_addr: &str,
        target_provider: u16,
        target_db: DatabaseId,
        scope: Scope,
        flag: MigrationFlag,
    ) -> Result<()> {
        let registry = self.registry.read();
        let backend = registry.get(source_db)?;
        self.fabric().lookup(target_addr)?;
        info!(%source_db, target = target_addr, "starting walking migration");

        let mut cursor: Option<Vec<u8>> = None;
        let mut forwarded = 0usize;
        loop {
            let batch = next_batch(backend.as_ref(), &scope, cursor.as_deref())?;
            if batch.is_empty() {
                break;
            }
            let batch_len = batch.len();
            let last_key = batch.last().map(|(key, _)| key.clone());

            for (key, value) in batch {
                self.forward_pair(target_addr, target_provider, target_db, &key, value)?;
                forwarded += 1;
                if flag == MigrationFlag::RemoveOriginal {
                    let _ = backend.erase(&key);
                }
            }

            if flag == MigrationFlag::KeepOriginal {
                cursor = last_key;
            }
            if batch_len < MIGRATION_BATCH {
                break;
            }
        }
        debug!(%source_db, forwarded, "walking migration finished");
        Ok(())
    }
}

fn next_batch(
    backend: &dyn Backend,
    scope: &Scope,
    cursor: Option<&[u8]>,
) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    match scope {
        Scope::All => backend.list_keyvals(cursor.unwrap_or(b""), b"", MIGRATION_BATCH),
        Scope::Prefix(prefix) => {
            backend.list_keyvals(cursor.unwrap_or(b""), prefix, MIGRATION_BATCH)
        }
        Scope::Range { lower, upper } => {
            backend.list_range(cursor.unwrap_or(lower.as_slice()), upper, MIGRATION_BATCH)
        }
    }
}
