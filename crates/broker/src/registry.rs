// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Concurrent map used for every process-wide registry.
//!
//! All access goes through one `RwLock`; get-or-insert re-checks under the
//! write lock so racing creators observe a single surviving value. The lock
//! is never held across an `.await` or while calling out to another registry.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;

pub struct SharedMap<K, V> {
    inner: RwLock<HashMap<K, V>>,
}

impl<K, V> SharedMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self { inner: RwLock::new(HashMap::new()) }
    }

    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.read().get(key).cloned()
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.read().contains_key(key)
    }

    /// Insert or replace, returning the previous value.
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.inner.write().insert(key, value)
    }

    /// Insert only if absent. Returns `false` when the key already existed.
    pub fn insert_new(&self, key: K, value: V) -> bool {
        let mut map = self.inner.write();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, value);
        true
    }

    /// Return the value for `key`, creating it with `create` if absent.
    ///
    /// `create` runs at most once per absent key across all racing callers.
    /// The flag is `true` for the caller whose value was stored.
    pub fn get_or_insert_with<F>(&self, key: K, create: F) -> (V, bool)
    where
        F: FnOnce() -> V,
    {
        if let Some(v) = self.inner.read().get(&key) {
            return (v.clone(), false);
        }

        let mut map = self.inner.write();
        // Double-check after acquiring write lock.
        if let Some(v) = map.get(&key) {
            return (v.clone(), false);
        }
        let value = create();
        map.insert(key, value.clone());
        (value, true)
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.inner.write().remove(key)
    }

    /// Snapshot of all values; safe to iterate while the map keeps changing.
    pub fn values(&self) -> Vec<V> {
        self.inner.read().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}

impl<K, V> SharedMap<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().keys().cloned().collect()
    }
}

impl<K, V> Default for SharedMap<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
