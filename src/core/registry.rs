//! Thread-safe catalog of named items.
//!
//! [`Registry`] is the building block for every named catalog in the crate:
//! the middleware registry and the collaborator client registry both wrap it.
//! Every entry remembers the sequence number it was registered with so that
//! consumers needing a stable order (the orchestrator's equal-priority
//! tie-break, diagnostic listings) never depend on hash map iteration order.
use std::{
    collections::HashMap,
    fmt,
    ops::ControlFlow,
    sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

/// Errors returned by [`Registry`] operations.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("'{name}' is already registered")]
    Duplicate { name: String },

    #[error("'{name}' is not registered")]
    NotFound { name: String },
}

struct Entry<T> {
    seq: u64,
    item: T,
}

struct Inner<T> {
    entries: HashMap<String, Entry<T>>,
    next_seq: u64,
}

impl<T> Inner<T> {
    fn insert_new(&mut self, name: String, item: T) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(name, Entry { seq, item });
    }
}

/// A name → item map guarded by a reader/writer lock.
pub struct Registry<T> {
    inner: RwLock<Inner<T>>,
}

impl<T: Clone> Registry<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    // Every mutation is a single map call, so a poisoned lock still guards a
    // consistent map.
    fn read(&self) -> RwLockReadGuard<'_, Inner<T>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<T>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register `item` under `name`, failing if the name is taken.
    pub fn register(&self, name: impl Into<String>, item: T) -> Result<(), RegistryError> {
        let name = name.into();
        let mut inner = self.write();
        if inner.entries.contains_key(&name) {
            return Err(RegistryError::Duplicate { name });
        }
        inner.insert_new(name, item);
        Ok(())
    }

    /// Look up an item by name.
    pub fn get(&self, name: &str) -> Result<T, RegistryError> {
        self.read()
            .entries
            .get(name)
            .map(|entry| entry.item.clone())
            .ok_or_else(|| RegistryError::NotFound {
                name: name.to_string(),
            })
    }

    pub fn has(&self, name: &str) -> bool {
        self.read().entries.contains_key(name)
    }

    /// Copy of the full mapping. Mutating the returned map has no effect on
    /// the registry.
    pub fn all(&self) -> HashMap<String, T> {
        self.read()
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.item.clone()))
            .collect()
    }

    /// Entries in registration order.
    pub fn entries(&self) -> Vec<(String, T)> {
        let inner = self.read();
        let mut entries: Vec<(u64, String, T)> = inner
            .entries
            .iter()
            .map(|(name, entry)| (entry.seq, name.clone(), entry.item.clone()))
            .collect();
        drop(inner);
        entries.sort_by_key(|(seq, _, _)| *seq);
        entries
            .into_iter()
            .map(|(_, name, item)| (name, item))
            .collect()
    }

    /// Names in registration order.
    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(name, _)| name).collect()
    }

    pub fn count(&self) -> usize {
        self.read().entries.len()
    }

    /// Remove an entry, returning whether it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.write().entries.remove(name).is_some()
    }

    pub fn clear(&self) {
        self.write().entries.clear();
    }

    /// Insert or overwrite `name`. Returns `true` when an existing entry was
    /// replaced; a replaced entry keeps its original registration position.
    pub fn replace(&self, name: impl Into<String>, item: T) -> bool {
        let name = name.into();
        let mut inner = self.write();
        match inner.entries.get_mut(&name) {
            Some(entry) => {
                entry.item = item;
                true
            }
            None => {
                inner.insert_new(name, item);
                false
            }
        }
    }

    /// Visit entries in registration order until `visit` breaks.
    ///
    /// The visitor runs on a snapshot, so it may call back into the registry.
    pub fn for_each<F>(&self, mut visit: F)
    where
        F: FnMut(&str, &T) -> ControlFlow<()>,
    {
        for (name, item) in self.entries() {
            if visit(&name, &item).is_break() {
                break;
            }
        }
    }
}

impl<T: Clone> Default for Registry<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> fmt::Debug for Registry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("count", &self.count())
            .field("keys", &self.keys())
            .finish()
    }
}
