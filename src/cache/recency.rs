//! Recency List Module
//!
//! Keyed access-order tracking used by the LRU and ARC stores.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

// == Recency List ==
/// Tracks keys in access order.
///
/// Every key carries a monotonically increasing stamp; the smallest stamp is
/// the least recently used key. `index` and `order` always hold the same
/// key set.
#[derive(Debug)]
pub struct RecencyList<K> {
    /// Key -> stamp of its last touch
    index: HashMap<K, u64>,
    /// Stamp -> key, oldest first
    order: BTreeMap<u64, K>,
    next_stamp: u64,
}

impl<K> Default for RecencyList<K> {
    fn default() -> Self {
        Self {
            index: HashMap::new(),
            order: BTreeMap::new(),
            next_stamp: 0,
        }
    }
}

impl<K> RecencyList<K>
where
    K: Eq + Hash + Clone,
{
    // == Constructor ==
    pub fn new() -> Self {
        Self::default()
    }

    // == Touch ==
    /// Marks a key as most recently used, adding it if absent.
    pub fn touch(&mut self, key: &K) {
        let stamp = self.next_stamp;
        self.next_stamp += 1;

        match self.index.get_mut(key) {
            Some(old) => {
                self.order.remove(&*old);
                *old = stamp;
            }
            None => {
                self.index.insert(key.clone(), stamp);
            }
        }
        self.order.insert(stamp, key.clone());
    }

    // == Remove ==
    /// Removes a key, returning whether it was tracked.
    pub fn remove(&mut self, key: &K) -> bool {
        match self.index.remove(key) {
            Some(stamp) => {
                self.order.remove(&stamp);
                true
            }
            None => false,
        }
    }

    // == Evict Oldest ==
    /// Returns and removes the least recently used key.
    pub fn pop_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.index.remove(&key);
        Some(key)
    }

    // == Peek Oldest ==
    pub fn peek_oldest(&self) -> Option<&K> {
        self.order.values().next()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.index.contains_key(key)
    }

    pub fn clear(&mut self) {
        self.index.clear();
        self.order.clear();
    }

    /// Keys from least to most recently used.
    pub fn iter(&self) -> impl Iterator<Item = &K> {
        self.order.values()
    }
}
