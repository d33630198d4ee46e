//! In-memory ordered map backend.
//!
//! Keys are wrapped in [`OrderedKey`] so the tree's order is the bound
//! comparator's order; listings fall out of plain tree iteration. Everything
//! lives behind one `RwLock` — reads iterate concurrently, writes exclude.

use crate::backend::Backend;
use crate::comparator::{KeyComparator, OrderedKey};
use crate::fileset::Fileset;
use keyfab_core::{BackendKind, DatabaseConfig, Error, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// The in-memory ordered map backend.
pub struct MapStore {
    name: String,
    path: PathBuf,
    no_overwrite: bool,
    order: Arc<KeyComparator>,
    map: RwLock<BTreeMap<OrderedKey, Vec<u8>>>,
}

impl MapStore {
    /// Open an empty map under the given comparator.
    pub fn open(config: &DatabaseConfig, comparator: KeyComparator) -> Self {
        MapStore {
            name: config.name.clone(),
            path: config.path.clone(),
            no_overwrite: config.no_overwrite,
            order: Arc::new(comparator),
            map: RwLock::new(BTreeMap::new()),
        }
    }

    fn wrap(&self, key: &[u8]) -> OrderedKey {
        OrderedKey::new(key.to_vec(), self.order.clone())
    }

    /// Number of keys currently stored. Test support.
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// True when no keys are stored.
    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    fn start_bound(&self, start: &[u8]) -> Bound<OrderedKey> {
        if start.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(self.wrap(start))
        }
    }
}

impl Backend for MapStore {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Map
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn comparator_name(&self) -> Option<&str> {
        self.order.name()
    }

    fn no_overwrite(&self) -> bool {
        self.no_overwrite
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        let mut map = self.map.write();
        let key = self.wrap(key);
        if self.no_overwrite && map.contains_key(&key) {
            return Err(Error::KeyExists);
        }
        map.insert(key, value.to_vec());
        Ok(())
    }

    fn get(&self, key: &[u8]) -> Result<Vec<u8>> {
        self.map
            .read()
            .get(&self.wrap(key))
            .cloned()
            .ok_or(Error::UnknownKey)
    }

    fn exists(&self, key: &[u8]) -> Result<bool> {
        Ok(self.map.read().contains_key(&self.wrap(key)))
    }

    fn erase(&self, key: &[u8]) -> Result<()> {
        match self.map.write().remove(&self.wrap(key)) {
            Some(_) => Ok(()),
            None => Err(Error::Erase),
        }
    }

    fn list_keys(&self, start: &[u8], prefix: &[u8], max: usize) -> Result<Vec<Vec<u8>>> {
        let map = self.map.read();
        let mut keys = Vec::new();
        for (key, _) in map.range((self.start_bound(start), Bound::Unbounded)) {
            if keys.len() >= max {
                break;
            }
            if key.bytes().starts_with(prefix) {
                keys.push(key.bytes().to_vec());
            }
        }
        Ok(keys)
    }

    fn list_keyvals(
        &self,
        start: &[u8],
        prefix: &[u8],
        max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let map = self.map.read();
        let mut pairs = Vec::new();
        for (key, value) in map.range((self.start_bound(start), Bound::Unbounded)) {
            if pairs.len() >= max {
                break;
            }
            if key.bytes().starts_with(prefix) {
                pairs.push((key.bytes().to_vec(), value.clone()));
            }
        }
        Ok(pairs)
    }

    fn list_range(
        &self,
        lower: &[u8],
        upper: &[u8],
        max: usize,
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        // An empty or inverted interval has nothing in it (and would panic
        // the tree's range check).
        if self.order.compare(lower, upper) != std::cmp::Ordering::Less {
            return Ok(Vec::new());
        }
        let map = self.map.read();
        let mut pairs = Vec::new();
        let bounds = (
            Bound::Excluded(self.wrap(lower)),
            Bound::Excluded(self.wrap(upper)),
        );
        for (key, value) in map.range(bounds) {
            if max != 0 && pairs.len() >= max {
                break;
            }
            pairs.push((key.bytes().to_vec(), value.clone()));
        }
        Ok(pairs)
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }

    fn create_fileset(&self) -> Result<Option<Fileset>> {
        Ok(None)
    }
}
