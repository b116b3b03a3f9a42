//! Lock-free ordered in-memory store
//!
//! The [`MemStore`] is the read-serving half of the engine: a concurrent
//! skip list mapping keys to versioned values. Readers never block on
//! writers and writers never block readers; two concurrent writes to the
//! same key resolve to whichever the durability manager serialized last.
//!
//! Iteration (`iter`, `scan_prefix`) observes a consistent view of the
//! keys it returns but may miss keys inserted after the iteration began —
//! the usual skip-list guarantee, and exactly what snapshot writing and
//! prefix scans need.

use basalt_core::{Key, Value};

use crossbeam_skiplist::SkipMap;

use std::ops::Bound;
use std::sync::atomic::{AtomicU64, Ordering};

/// A value together with the monotonic version assigned on write
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue {
    pub value: Value,
    pub version: u64,
}

/// Ordered key-value store with lock-free concurrent access
pub struct MemStore {
    map: SkipMap<Key, VersionedValue>,
    next_version: AtomicU64,
}

impl Default for MemStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemStore {
    pub fn new() -> Self {
        Self {
            map: SkipMap::new(),
            next_version: AtomicU64::new(0),
        }
    }

    /// Inserts or updates a key, returning the version assigned to the write
    pub fn put(&self, key: Key, value: Value) -> u64 {
        let version = self.next_version.fetch_add(1, Ordering::Relaxed) + 1;
        self.map.insert(key, VersionedValue { value, version });
        version
    }

    /// Returns the current value for a key
    pub fn get(&self, key: &[u8]) -> Option<Value> {
        self.map.get(key).map(|entry| entry.value().value.clone())
    }

    /// Returns the current value and its version
    pub fn get_versioned(&self, key: &[u8]) -> Option<VersionedValue> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Removes a key, returning whether it was present
    pub fn delete(&self, key: &[u8]) -> bool {
        self.map.remove(key).is_some()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over all pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (Key, Value)> + '_ {
        self.map
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
    }

    /// Lazily iterates over all pairs whose key starts with `prefix`, in key order
    pub fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> impl Iterator<Item = (Key, Value)> + 'a {
        let lower = Bound::Included(prefix.to_vec());
        let upper = match prefix_upper_bound(prefix) {
            Some(bound) => Bound::Excluded(bound),
            None => Bound::Unbounded,
        };

        self.map
            .range((lower, upper))
            .map(|entry| (entry.key().clone(), entry.value().value.clone()))
    }
}

/// Smallest key strictly greater than every key with the given prefix
///
/// `None` when no such key exists (empty prefix or all `0xFF` bytes).
fn prefix_upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut bound = prefix.to_vec();
    while let Some(last) = bound.last_mut() {
        if *last < 0xFF {
            *last += 1;
            return Some(bound);
        }
        bound.pop();
    }
    None
}
