//! A backend that stores nothing.
//!
//! Accepts every write and reports every key absent. Useful for measuring
//! the engine and fabric layers without storage cost.

use crate::backend::Backend;
use crate::fileset::Fileset;
use keyfab_core::{BackendKind, DatabaseConfig, Error, Result};
use std::path::{Path, PathBuf};

/// The discarding backend.
#[derive(Debug)]
pub struct NullStore {
    name: String,
    path: PathBuf,
}

impl NullStore {
    /// Open a null store; never fails.
    pub fn open(config: &DatabaseConfig) -> Self {
        NullStore {
            name: config.name.clone(),
            path: config.path.clone(),
        }
    }
}

impl Backend for NullStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Null
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn comparator_name(&self) -> Option<&str> {
        None
    }

    fn no_overwrite(&self) -> bool {
        false
    }

    fn put(&self, _key: &[u8], _value: &[u8]) -> Result<()> {
        Ok(())
    }

    fn get(&self, _key: &[u8]) -> Result<Vec<u8>> {
        Err(Error::UnknownKey)
    }

    fn exists(&self, _key: &[u8]) -> Result<bool> {
        Ok(false)
    }

    fn erase(&self, _key: &[u8]) -> Result<()> {
        Err(Error::Erase)
    }

    fn list_keys(&self, _start: &[u8], _prefix: &[u8], _max: usize) -> Result<Vec<Vec<u8>>> {
        Ok(Vec::new())
    }

    fn list_keyvals(
        &self,
        _start: &[u8],
        _prefix: &[u8],
        _max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(Vec::new())
    }

    fn list_range(
        &self,
        _lower: &[u8],
        _upper: &[u8],
        _max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(Vec::new())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn create_fileset(&self) -> Result<Option<Fileset>> {
        Ok(None)
    }
}
