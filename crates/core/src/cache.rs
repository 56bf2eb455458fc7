// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded TTL cache for read-heavy request handlers (namespace lists,
//! pipeline metadata).
//!
//! Entries expire after a fixed TTL and the map is capped at `max_entries`,
//! evicting the oldest insertion. Expiry is lazy: expired entries are
//! dropped when touched by `get` or swept during `set`.

use crate::clock::{Clock, SystemClock};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_ENTRIES: usize = 1000;

struct Entry<V> {
    value: V,
    expires_at_ms: u64,
}

/// Thread-safe TTL cache; clones share the same underlying map.
pub struct TtlCache<K, V, C: Clock = SystemClock> {
    inner: Arc<Mutex<IndexMap<K, Entry<V>>>>,
    ttl_ms: u64,
    max_entries: usize,
    clock: C,
}

impl<K, V, C: Clock> Clone for TtlCache<K, V, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            ttl_ms: self.ttl_ms,
            max_entries: self.max_entries,
            clock: self.clock.clone(),
        }
    }
}

impl<K: Eq + Hash, V: Clone> TtlCache<K, V, SystemClock> {
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self::with_clock(ttl, max_entries, SystemClock)
    }
}

impl<K: Eq + Hash, V: Clone> Default for TtlCache<K, V, SystemClock> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }
}

impl<K: Eq + Hash, V: Clone, C: Clock> TtlCache<K, V, C> {
    pub fn with_clock(ttl: Duration, max_entries: usize, clock: C) -> Self {
        Self {
            inner: Arc::new(Mutex::new(IndexMap::new())),
            ttl_ms: ttl.as_millis() as u64,
            max_entries: max_entries.max(1),
            clock,
        }
    }

    /// Look up a key, dropping it if expired.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.epoch_ms();
        let mut map = self.inner.lock();
        let live = map.get(key)?.expires_at_ms > now;
        if !live {
            map.shift_remove(key);
            return None;
        }
        map.get(key).map(|entry| entry.value.clone())
    }

    /// Insert or update a value.
    ///
    /// Updating an existing key keeps its insertion position. A fresh insert
    /// sweeps expired entries first, then evicts the oldest entry if the map
    /// is still at capacity.
    pub fn set(&self, key: K, value: V) {
        let now = self.clock.epoch_ms();
        let expires_at_ms = now + self.ttl_ms;
        let mut map = self.inner.lock();

        if let Some(entry) = map.get_mut(&key) {
            entry.value = value;
            entry.expires_at_ms = expires_at_ms;
            return;
        }

        map.retain(|_, entry| entry.expires_at_ms > now);
        if map.len() >= self.max_entries {
            map.shift_remove_index(0);
        }
        map.insert(key, Entry { value, expires_at_ms });
    }

    pub fn delete(&self, key: &K) -> bool {
        self.inner.lock().shift_remove(key).is_some()
    }

    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "cache_tests.rs"]
mod tests;
