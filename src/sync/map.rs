// (c) 2025 peerlink developers

//! Mutex-guarded keyed map
//!
//! A small linearizable map used for pending-file-request bookkeeping. Every
//! operation takes the one lock, so `len` is exact and get-after-insert is
//! always observed.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// Concurrent `K → V` map. See the [module docs](self).
#[derive(Debug)]
pub struct ConcurrentMap<K, V> {
    inner: Mutex<HashMap<K, V>>,
}

impl<K, V> Default for ConcurrentMap<K, V> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }
}

impl<K: Eq + Hash, V: Clone> ConcurrentMap<K, V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `value` under `key`, replacing any previous value.
    pub fn insert_or_assign(&self, key: K, value: V) {
        let _ = self.inner.lock().insert(key, value);
    }

    /// Removes `key`. Returns whether it was present.
    pub fn erase(&self, key: &K) -> bool {
        self.inner.lock().remove(key).is_some()
    }

    /// Clone-out lookup.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.inner.lock().get(key).cloned()
    }

    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.inner.lock().contains_key(key)
    }

    /// Exact entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}
