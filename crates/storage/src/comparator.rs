//! Named key comparators and the per-provider comparator registry.
//!
//! A comparator is a total order over raw key bytes. Databases bind one at
//! attach time and the binding never changes afterwards; listing order is
//! exactly the bound comparator's order. When no comparator is named,
//! lexicographic byte order applies.

use keyfab_core::{Error, Result};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

/// User-supplied total order over byte strings.
pub type CompareFn = Arc<dyn Fn(&[u8], &[u8]) -> Ordering + Send + Sync>;

/// A key ordering, either the lexicographic default or a named function.
#[derive(Clone)]
pub struct KeyComparator {
    name: Option<String>,
    func: Option<CompareFn>,
}

impl KeyComparator {
    /// The default ordering: lexicographic over raw bytes.
    pub fn lexicographic() -> Self {
        KeyComparator {
            name: None,
            func: None,
        }
    }

    /// A named, user-supplied ordering.
    pub fn named(name: impl Into<String>, func: CompareFn) -> Self {
        KeyComparator {
            name: Some(name.into()),
            func: Some(func),
        }
    }

    /// Name of the comparator, absent for the lexicographic default.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// True when this is the lexicographic default.
    pub fn is_default(&self) -> bool {
        self.func.is_none()
    }

    /// Compare two keys under this ordering.
    pub fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        match &self.func {
            Some(func) => func(a, b),
            None => a.cmp(b),
        }
    }
}

impl std::fmt::Debug for KeyComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyComparator")
            .field("name", &self.name)
            .finish()
    }
}

/// A key wrapped with the ordering its container uses.
///
/// In-memory backends key their `BTreeMap` with this so the tree's order
/// *is* the comparator's order. The comparator travels as a shared pointer;
/// every key in one container holds the same one.
#[derive(Clone)]
pub struct OrderedKey {
    bytes: Vec<u8>,
    order: Arc<KeyComparator>,
}

impl OrderedKey {
    /// Wrap `bytes` under `order`.
    pub fn new(bytes: Vec<u8>, order: Arc<KeyComparator>) -> Self {
        OrderedKey { bytes, order }
    }

    /// The raw key bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Unwrap into the raw key bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

impl PartialEq for OrderedKey {
    fn eq(&self, other: &Self) -> bool {
        self.order.compare(&self.bytes, &other.bytes) == Ordering::Equal
    }
}

impl Eq for OrderedKey {}

impl PartialOrd for OrderedKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrderedKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.order.compare(&self.bytes, &other.bytes)
    }
}

impl std::fmt::Debug for OrderedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderedKey({:?})", self.bytes)
    }
}

/// Registry of named comparators for one provider.
///
/// Comparators must be registered before attaching a database that names
/// them; an unknown name at attach time fails that attach with `CompFunc`.
#[derive(Default)]
pub struct ComparatorRegistry {
    funcs: RwLock<HashMap<String, CompareFn>>,
}

impl ComparatorRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `func` under `name`.
    ///
    /// Fails with `CompFunc` if the name is already taken.
    pub fn register(&self, name: impl Into<String>, func: CompareFn) -> Result<()> {
        let name = name.into();
        let mut funcs = self.funcs.write();
        if funcs.contains_key(&name) {
            return Err(Error::CompFunc(name));
        }
        funcs.insert(name, func);
        Ok(())
    }

    /// Resolve an optional comparator name into a [`KeyComparator`].
    ///
    /// `None` resolves to the lexicographic default; an unknown name fails
    /// with `CompFunc`.
    pub fn resolve(&self, name: Option<&str>) -> Result<KeyComparator> {
        match name {
            None => Ok(KeyComparator::lexicographic()),
            Some(name) => {
                let funcs = self.funcs.read();
                let func = funcs
                    .get(name)
                    .cloned()
                    .ok_or_else(|| Error::CompFunc(name.to_string()))?;
                Ok(KeyComparator::named(name, func))
            }
        }
    }

    /// True if `name` is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.funcs.read().contains_key(name)
    }
}

impl std::fmt::Debug for ComparatorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let funcs = self.funcs.read();
        f.debug_struct("ComparatorRegistry")
            .field("count", &funcs.len())
            .finish()
    }
}
