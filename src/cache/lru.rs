//! LRU Store Module
//!
//! Implements Least Recently Used eviction.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use tracing::debug;

use crate::cache::eviction::{EntryRef, EvictionStore};
use crate::cache::{CacheEntry, RecencyList};

// == LRU Store ==
/// Evicts the least recently touched key when full.
///
/// A capacity of 0 means unbounded.
#[derive(Debug)]
pub struct LruStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    /// Access order, oldest first
    order: RecencyList<K>,
    capacity: usize,
}

impl<K, V> LruStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(capacity),
            order: RecencyList::new(),
            capacity,
        }
    }

    /// The key that would be evicted next.
    pub fn peek_victim(&self) -> Option<&K> {
        self.order.peek_oldest()
    }

    fn is_full(&self) -> bool {
        self.capacity > 0 && self.entries.len() >= self.capacity
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.entries.len(), self.order.len());
        assert!(self.order.iter().all(|k| self.entries.contains_key(k)));
        if self.capacity > 0 {
            assert!(self.entries.len() <= self.capacity);
        }
    }
}

impl<K, V> EvictionStore<K, V> for LruStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        let mut victim = None;

        if !self.entries.contains_key(&key) && self.is_full() {
            if let Some(oldest) = self.order.pop_oldest() {
                debug!("LRU store evicting least recently used entry");
                victim = self
                    .entries
                    .remove(&oldest)
                    .map(|entry| (oldest, entry.value));
            }
        }

        self.order.touch(&key);
        self.entries.insert(key, CacheEntry::new(value, expires_at));
        victim
    }

    fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    fn touch(&mut self, key: &K) {
        if self.entries.contains_key(key) {
            self.order.touch(key);
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        self.order.remove(key);
        Some(entry.value)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) -> Vec<(K, V)> {
        self.order.clear();
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }
}
