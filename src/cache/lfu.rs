//! LFU Store Module
//!
//! Implements Least Frequently Used eviction.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Instant;

use tracing::debug;

use crate::cache::eviction::{EntryRef, EvictionStore};
use crate::cache::CacheEntry;

/// Ordering key: (access count, touch stamp). The smallest is the victim.
type Rank = (u64, u64);

#[derive(Debug)]
struct LfuSlot<V> {
    entry: CacheEntry<V>,
    rank: Rank,
}

// == LFU Store ==
/// Evicts the key with the fewest accesses when full.
///
/// Among keys with the same count the least recently touched one goes
/// first. New keys start at a count of 0; overwriting a key keeps its
/// count. A capacity of 0 means unbounded.
#[derive(Debug)]
pub struct LfuStore<K, V> {
    slots: HashMap<K, LfuSlot<V>>,
    /// Frequency buckets flattened into one ordered map
    ranks: BTreeMap<Rank, K>,
    next_stamp: u64,
    capacity: usize,
}

impl<K, V> LfuStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: HashMap::with_capacity(capacity),
            ranks: BTreeMap::new(),
            next_stamp: 0,
            capacity,
        }
    }

    /// Access count of `key`, if stored.
    pub fn frequency(&self, key: &K) -> Option<u64> {
        self.slots.get(key).map(|slot| slot.rank.0)
    }

    /// The key that would be evicted next.
    pub fn peek_victim(&self) -> Option<&K> {
        self.ranks.values().next()
    }

    fn stamp(&mut self) -> u64 {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        stamp
    }

    fn is_full(&self) -> bool {
        self.capacity > 0 && self.slots.len() >= self.capacity
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        assert_eq!(self.slots.len(), self.ranks.len());
        for (rank, key) in &self.ranks {
            assert_eq!(self.slots.get(key).map(|s| s.rank), Some(*rank));
        }
        if self.capacity > 0 {
            assert!(self.slots.len() <= self.capacity);
        }
    }
}

impl<K, V> EvictionStore<K, V> for LfuStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        if let Some(slot) = self.slots.get_mut(&key) {
            slot.entry = CacheEntry::new(value, expires_at);
            return None;
        }

        let mut victim = None;
        if self.is_full() {
            if let Some((rank, oldest)) = self.ranks.pop_first() {
                debug!(frequency = rank.0, "LFU store evicting least frequently used entry");
                victim = self
                    .slots
                    .remove(&oldest)
                    .map(|slot| (oldest, slot.entry.value));
            }
        }

        let rank = (0, self.stamp());
        self.ranks.insert(rank, key.clone());
        self.slots.insert(
            key,
            LfuSlot {
                entry: CacheEntry::new(value, expires_at),
                rank,
            },
        );
        victim
    }

    fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.slots.get(key).map(|slot| &slot.entry)
    }

    fn touch(&mut self, key: &K) {
        let stamp = self.stamp();
        if let Some(slot) = self.slots.get_mut(key) {
            if let Some(k) = self.ranks.remove(&slot.rank) {
                slot.rank = (slot.rank.0.saturating_add(1), stamp);
                self.ranks.insert(slot.rank, k);
            }
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let slot = self.slots.remove(key)?;
        self.ranks.remove(&slot.rank);
        Some(slot.entry.value)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_> {
        Box::new(self.slots.iter().map(|(key, slot)| (key, &slot.entry)))
    }

    fn len(&self) -> usize {
        self.slots.len()
    }

    fn clear(&mut self) -> Vec<(K, V)> {
        self.ranks.clear();
        self.slots
            .drain()
            .map(|(key, slot)| (key, slot.entry.value))
            .collect()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lfu_evicts_lowest_frequency() {
        let mut store = LfuStore::new(2);
        store.insert("a", 1, None);
        store.insert("b", 2, None);
        store.touch(&"a");
        store.touch(&"a");

        let victim = store.insert("c", 3, None);

        assert_eq!(victim, Some(("b", 2)));
        assert_eq!(store.frequency(&"a"), Some(2));
        assert_eq!(store.frequency(&"c"), Some(0));
        store.check_invariants();
    }

    #[test]
    fn test_lfu_ties_broken_by_recency() {
        let mut store = LfuStore::new(3);
        store.insert("a", 1, None);
        store.insert("b", 2, None);
        store.insert("c", 3, None);
        store.touch(&"b");
        store.touch(&"a");
        store.touch(&"c");

        // all at frequency 1, "b" touched longest ago
        assert_eq!(store.peek_victim(), Some(&"b"));
        assert_eq!(store.insert("d", 4, None).map(|(k, _)| k), Some("b"));
        store.check_invariants();
    }

    #[test]
    fn test_lfu_overwrite_keeps_frequency() {
        let mut store = LfuStore::new(2);
        store.insert("a", 1, None);
        store.touch(&"a");
        store.insert("a", 5, None);

        assert_eq!(store.frequency(&"a"), Some(1));
        assert_eq!(store.peek(&"a").map(|e| e.value), Some(5));
        assert_eq!(store.len(), 1);
        store.check_invariants();
    }

    #[test]
    fn test_lfu_new_key_is_first_candidate() {
        let mut store = LfuStore::new(2);
        store.insert("a", 1, None);
        store.touch(&"a");
        store.insert("b", 2, None);

        assert_eq!(store.insert("c", 3, None).map(|(k, _)| k), Some("b"));
        assert_eq!(store.insert("d", 4, None).map(|(k, _)| k), Some("c"));
        store.check_invariants();
    }

    #[test]
    fn test_lfu_remove_and_clear() {
        let mut store = LfuStore::new(0);
        store.insert("a", 1, None);
        store.insert("b", 2, None);

        assert_eq!(store.remove(&"a"), Some(1));
        assert_eq!(store.frequency(&"a"), None);
        store.check_invariants();

        assert_eq!(store.clear(), vec![("b", 2)]);
        assert!(store.is_empty());
        store.check_invariants();
    }
}
