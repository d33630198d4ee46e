//! Name↔id↔backend bookkeeping for one provider.
//!
//! The registry itself is plain data; the provider wraps it in the
//! provider-wide `RwLock` and routes every access through that lock.
//! Dropping a backend's last `Arc` closes it, so `remove` completing under
//! the write lock only releases storage once in-flight readers (who hold
//! clones or the read lock) are gone.

use keyfab_core::{DatabaseId, Error, Result};
use keyfab_fabric::DbEntry;
use keyfab_storage::Backend;
use std::collections::HashMap;
use std::sync::Arc;

/// The database table of one provider.
#[derive(Default)]
pub struct DatabaseRegistry {
    databases: HashMap<DatabaseId, Arc<dyn Backend>>,
    by_name: HashMap<String, DatabaseId>,
    insertion: Vec<DatabaseId>,
}

impl DatabaseRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if `name` is already attached.
    pub fn contains_name(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Record an attached backend under a fresh id.
    ///
    /// The caller (the provider, under its write lock) guarantees both the
    /// id and the name are unused.
    pub fn insert(&mut self, id: DatabaseId, backend: Arc<dyn Backend>) {
        debug_assert!(!self.databases.contains_key(&id));
        debug_assert!(!self.by_name.contains_key(backend.name()));
        self.by_name.insert(backend.name().to_string(), id);
        self.insertion.push(id);
        self.databases.insert(id, backend);
    }

    /// Drop the mapping for `id`, returning the backend for the caller to
    /// release.
    pub fn remove(&mut self, id: DatabaseId) -> Result<Arc<dyn Backend>> {
        let backend = self.databases.remove(&id).ok_or(Error::UnknownDb(id))?;
        self.by_name.remove(backend.name());
        self.insertion.retain(|&entry| entry != id);
        Ok(backend)
    }

    /// Drop every mapping, returning the backends for release.
    pub fn remove_all(&mut self) -> Vec<Arc<dyn Backend>> {
        self.by_name.clear();
        self.insertion.clear();
        self.databases.drain().map(|(_, backend)| backend).collect()
    }

    /// Number of attached databases.
    pub fn count(&self) -> usize {
        self.databases.len()
    }

    /// `(name, id)` rows in attach order.
    pub fn entries(&self) -> Vec<DbEntry> {
        self.insertion
            .iter()
            .filter_map(|&id| {
                self.databases.get(&id).map(|backend| DbEntry {
                    name: backend.name().to_string(),
                    id,
                })
            })
            .collect()
    }

    /// Resolve an id to its backend.
    pub fn get(&self, id: DatabaseId) -> Result<&Arc<dyn Backend>> {
        self.databases.get(&id).ok_or(Error::UnknownDb(id))
    }

    /// Resolve a name to its id.
    pub fn id_by_name(&self, name: &str) -> Result<DatabaseId> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| Error::DbName(name.to_string()))
    }
}

impl std::fmt::Debug for DatabaseRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseRegistry")
            .field("count", &self.databases.len())
            .finish()
    }
}
