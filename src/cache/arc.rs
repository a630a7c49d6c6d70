//! ARC Store Module
//!
//! Adaptive Replacement Cache: balances recency against frequency by
//! watching which of two ghost lists recently evicted keys come back from.
//!
//! ```text
//!   T1: resident, seen once          T2: resident, seen again
//!   B1: ghosts evicted from T1       B2: ghosts evicted from T2
//!
//!   |T1| + |T2|               <= c
//!   |T1| + |B1|               <= c
//!   |T1| + |T2| + |B1| + |B2| <= 2c
//! ```
//!
//! `p` is the target size of T1. A comeback from B1 grows it, a comeback
//! from B2 shrinks it.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use tracing::debug;

use crate::cache::eviction::{EntryRef, EvictionStore};
use crate::cache::{CacheEntry, RecencyList};

// == ARC Store ==
#[derive(Debug)]
pub struct ArcStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
    t1: RecencyList<K>,
    t2: RecencyList<K>,
    b1: RecencyList<K>,
    b2: RecencyList<K>,
    /// Target size of T1
    p: usize,
    capacity: usize,
}

impl<K, V> ArcStore<K, V>
where
    K: Eq + Hash + Clone,
{
    /// Creates a store holding at most `capacity` entries (at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            t1: RecencyList::new(),
            t2: RecencyList::new(),
            b1: RecencyList::new(),
            b2: RecencyList::new(),
            p: 0,
            capacity,
        }
    }

    /// Current target size of T1.
    pub fn target_recent(&self) -> usize {
        self.p
    }

    /// Sizes of (T1, T2, B1, B2).
    pub fn list_lens(&self) -> (usize, usize, usize, usize) {
        (self.t1.len(), self.t2.len(), self.b1.len(), self.b2.len())
    }

    pub fn is_ghost(&self, key: &K) -> bool {
        self.b1.contains(key) || self.b2.contains(key)
    }

    fn is_full(&self) -> bool {
        self.t1.len() + self.t2.len() >= self.capacity
    }

    /// Frees one resident slot if the cache is full, ghosting the victim.
    fn replace(&mut self, from_b2: bool) -> Option<(K, V)> {
        if !self.is_full() {
            return None;
        }

        let t1_len = self.t1.len();
        let take_t1 = t1_len > 0 && (t1_len > self.p || (from_b2 && t1_len == self.p));

        let victim = if take_t1 || self.t2.is_empty() {
            let key = self.t1.pop_oldest()?;
            self.b1.touch(&key);
            key
        } else {
            let key = self.t2.pop_oldest()?;
            self.b2.touch(&key);
            key
        };

        debug!(target_recent = self.p, "ARC store evicting entry into ghost list");
        self.entries
            .remove(&victim)
            .map(|entry| (victim, entry.value))
    }

    /// Makes room for a key that is in no list at all.
    fn admit_new(&mut self) -> Option<(K, V)> {
        let c = self.capacity;
        let (t1, t2, b1, b2) = self.list_lens();

        if t1 + b1 >= c {
            if t1 < c {
                self.b1.pop_oldest();
                self.replace(false)
            } else {
                // T1 alone fills the cache; drop its oldest without a ghost.
                let key = self.t1.pop_oldest()?;
                self.entries.remove(&key).map(|entry| (key, entry.value))
            }
        } else {
            let total = t1 + t2 + b1 + b2;
            if total >= c {
                if total >= 2 * c && self.b2.pop_oldest().is_none() {
                    self.b1.pop_oldest();
                }
                self.replace(false)
            } else {
                None
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let c = self.capacity;
        let (t1, t2, b1, b2) = self.list_lens();
        assert!(t1 + t2 <= c, "resident lists exceed capacity");
        assert!(t1 + b1 <= c, "T1 + B1 exceed capacity");
        assert!(t1 + t2 + b1 + b2 <= 2 * c, "directory exceeds 2c");
        assert!(self.p <= c);
        assert_eq!(self.entries.len(), t1 + t2);
        for key in self.entries.keys() {
            assert!(self.t1.contains(key) ^ self.t2.contains(key));
            assert!(!self.is_ghost(key));
        }
        assert!(self.b1.iter().all(|k| !self.b2.contains(k)));
    }
}

impl<K, V> EvictionStore<K, V> for ArcStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        let entry = CacheEntry::new(value, expires_at);

        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = entry;
            return None;
        }

        let victim = if self.b1.contains(&key) {
            let delta = (self.b2.len() / self.b1.len()).max(1);
            self.p = (self.p + delta).min(self.capacity);
            let victim = self.replace(false);
            self.b1.remove(&key);
            self.t2.touch(&key);
            victim
        } else if self.b2.contains(&key) {
            let delta = (self.b1.len() / self.b2.len()).max(1);
            self.p = self.p.saturating_sub(delta);
            let victim = self.replace(true);
            self.b2.remove(&key);
            self.t2.touch(&key);
            victim
        } else {
            let victim = self.admit_new();
            self.t1.touch(&key);
            victim
        };

        self.entries.insert(key, entry);
        victim
    }

    fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    fn touch(&mut self, key: &K) {
        if self.t1.remove(key) {
            self.t2.touch(key);
        } else if self.t2.contains(key) {
            self.t2.touch(key);
        }
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        if !self.t1.remove(key) {
            self.t2.remove(key);
        }
        Some(entry.value)
    }

    fn expire(&mut self, key: &K) -> Option<V> {
        let entry = self.entries.remove(key)?;
        if self.t1.remove(key) {
            self.b1.touch(key);
        } else if self.t2.remove(key) {
            self.b2.touch(key);
        }
        Some(entry.value)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) -> Vec<(K, V)> {
        self.t1.clear();
        self.t2.clear();
        self.b1.clear();
        self.b2.clear();
        self.p = 0;
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }
}
