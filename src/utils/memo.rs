//! Memoization primitives
//!
//! [`Memo`] caches a single derived value; [`Memoizer`] caches values by key.
//! Both hand back the identical value on every later read.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, Mutex, OnceLock};

use super::lock;

/// A value computed at most once
pub struct Memo<T> {
    cell: OnceLock<T>,
}

impl<T> Memo<T> {
    pub const fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    /// Return the cached value, computing it on first access
    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        self.cell.get_or_init(init)
    }

    /// The cached value, if any, without computing it
    pub fn peek(&self) -> Option<&T> {
        self.cell.get()
    }

    pub fn is_memoized(&self) -> bool {
        self.cell.get().is_some()
    }
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cell.get() {
            Some(value) => write!(f, "Memo({value:?})"),
            None => write!(f, "Memo(<pending>)"),
        }
    }
}

/// Keyed memoization
///
/// Keys are compared by value, so a tuple of arguments acts as an identity
/// key: equal tuples share one cached value, different order does not.
pub struct Memoizer<K, V> {
    entries: Mutex<HashMap<K, Arc<V>>>,
}

impl<K: Eq + Hash, V> Memoizer<K, V> {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn get_or_insert_with(&self, key: K, init: impl FnOnce(&K) -> V) -> Arc<V> {
        let mut entries = lock(&self.entries);
        if let Some(value) = entries.get(&key) {
            return value.clone();
        }
        let value = Arc::new(init(&key));
        entries.insert(key, value.clone());
        value
    }

    /// Like [`Memoizer::get_or_insert_with`], but failures are not cached
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        init: impl FnOnce(&K) -> Result<V, E>,
    ) -> Result<Arc<V>, E> {
        let mut entries = lock(&self.entries);
        if let Some(value) = entries.get(&key) {
            return Ok(value.clone());
        }
        let value = Arc::new(init(&key)?);
        entries.insert(key, value.clone());
        Ok(value)
    }

    pub fn contains(&self, key: &K) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K: Eq + Hash, V> Default for Memoizer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
