//! Persistent B-tree backend on top of `redb`.
//!
//! One table maps raw key bytes to raw value bytes. Ordering is the tree's
//! native byte order, which is why this backend refuses custom comparators
//! at open time (see [`crate::backend::open_backend`]). Commits are durable
//! when they return, so `sync` has nothing left to do.

use crate::backend::Backend;
use crate::fileset::Fileset;
use keyfab_core::{BackendKind, DatabaseConfig, Error, Result};
use redb::{Database, ReadableTable, TableDefinition};
use std::ops::Bound;
use std::path::{Path, PathBuf};

const TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("keyfab");

/// The `redb`-backed B-tree store.
pub struct BtreeStore {
    name: String,
    path: PathBuf,
    no_overwrite: bool,
    db: Database,
}

fn backend_err(e: impl std::fmt::Display) -> Error {
    Error::Put(e.to_string())
}

impl BtreeStore {
    /// Open or create the store file at the configured path.
    pub fn open(config: &DatabaseConfig) -> Result<Self> {
        if config.path.as_os_str().is_empty() {
            return Err(Error::DbCreate(format!(
                "btree store {:?} requires a storage path",
                config.name
            )));
        }
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| Error::DbCreate(format!("{}: {}", parent.display(), e)))?;
            }
        }
        let db = Database::create(&config.path)
            .map_err(|e| Error::DbCreate(format!("{}: {}", config.path.display(), e)))?;

        // Make sure the table exists so read transactions never race its
        // creation.
        let txn = db.begin_write().map_err(|e| Error::DbCreate(e.to_string()))?;
        txn.open_table(TABLE)
            .map_err(|e| Error::DbCreate(e.to_string()))?;
        txn.commit().map_err(|e| Error::DbCreate(e.to_string()))?;

        Ok(BtreeStore {
            name: config.name.clone(),
            path: config.path.clone(),
            no_overwrite: config.no_overwrite,
            db,
        })
    }

    fn collect<F>(&self, start: &[u8], max: usize, mut visit: F) -> Result<()>
    where
        F: FnMut(&[u8], &[u8]) -> bool,
    {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(TABLE).map_err(backend_err)?;
        let range = if start.is_empty() {
            table.range::<&[u8]>(..).map_err(backend_err)?
        } else {
            table
                .range::<&[u8]>((Bound::Excluded(start), Bound::Unbounded))
                .map_err(backend_err)?
        };
        // `max` is a hard cap here, matching the other backends; only
        // `list_range` treats zero as unbounded.
        let mut taken = 0usize;
        for entry in range {
            if taken >= max {
                break;
            }
            let (key, value) = entry.map_err(backend_err)?;
            if visit(key.value(), value.value()) {
                taken += 1;
            }
        }
        Ok(())
    }
}

impl Backend for BtreeStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::BtreeStore
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn comparator_name(&self) -> Option<&str> {
        None
    }

    fn no_overwrite(&self) -> bool {
        self.no_overwrite
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut table = txn.open_table(TABLE).map_err(backend_err)?;
            if self.no_overwrite && table.get(key).map_err(backend_err)?.is_some() {
                // The transaction is dropped without commit; nothing was
                // changed.
                return Err(Error::KeyExists);
            }
            table.insert(key, value).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;
        Ok(())
    }

    fn put_multi(&self, items: &[(Vec<u8>, Vec<u8>)]) -> Result<()> {
        // One transaction per item so an item that fails leaves the earlier
        // ones written, matching the batch contract.
        for (key, value) in items {
            self.put(key, value)?;
        }
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(TABLE).map_err(backend_err)?;
        match table.get(key).map_err(backend_err)? {
            Some(guard) => Ok(guard.value().to_vec()),
            None => Err(Error::UnknownKey),
        }
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(TABLE).map_err(backend_err)?;
        Ok(table.get(key).map_err(backend_err)?.is_some())
    }

    fn erase(&self, key: &[u8]) -> Result<()> {
        let txn = self.db.begin_write().map_err(backend_err)?;
        let removed = {
            let mut table = txn.open_table(TABLE).map_err(backend_err)?;
            let result = table.remove(key).map_err(backend_err)?.is_some();
            result
        };
        txn.commit().map_err(backend_err)?;
        if removed {
            Ok(())
        } else {
            Err(Error::Erase)
        }
    }

    fn list_keys(&self, start: &[u8], prefix: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        let mut keys = Vec::new();
        self.collect(start, max, |key, _| {
            if key.starts_with(prefix) {
                keys.push(key.to_vec());
                true
            } else {
                false
            }
        })?;
        Ok(keys)
    }

    fn list_keyvals(
        &self,
        start: &[u8],
        prefix: &[u8],
        max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut pairs = Vec::new();
        self.collect(start, max, |key, value| {
            if key.starts_with(prefix) {
                pairs.push((key.to_vec(), value.to_vec()));
                true
            } else {
                false
            }
        })?;
        Ok(pairs)
    }

    fn list_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        if lower >= upper {
            return Ok(Vec::new());
        }
        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = txn.open_table(TABLE).map_err(backend_err)?;
        let range = table
            .range::<&[u8]>((Bound::Excluded(lower), Bound::Excluded(upper)))
            .map_err(backend_err)?;
        let mut pairs = Vec::new();
        for entry in range {
            if max != 0 && pairs.len() >= max {
                break;
            }
            let (key, value) = entry.map_err(backend_err)?;
            pairs.push((key.value().to_vec(), value.value().to_vec()));
        }
        Ok(pairs)
    }

    fn sync(&self) -> Result<()> {
        // Commits are durable on return; nothing buffered to flush.
        Ok(())
    }

    fn create_fileset(&self) -> Result<Option<Fileset>> {
        let file = self
            .path
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| Error::InvalidArg(format!("bad store path {:?}", self.path)))?;
        let root = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut fileset = Fileset::new(
            root,
            vec![file.clone()],
            BackendKind::BtreeStore,
            &self.name,
            None,
            self.no_overwrite,
        );
        fileset.metadata.insert(
            crate::fileset::META_DATA_FILE.to_string(),
            file.to_string_lossy().into_owned(),
        );
        Ok(Some(fileset))
    }
}
