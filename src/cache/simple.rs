//! Simple Store Module
//!
//! Unbounded storage with no eviction order.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::Instant;

use crate::cache::eviction::{EntryRef, EvictionStore};
use crate::cache::CacheEntry;

// == Simple Store ==
/// Plain map store. The configured size is only a pre-allocation hint.
#[derive(Debug)]
pub struct SimpleStore<K, V> {
    entries: HashMap<K, CacheEntry<V>>,
}

impl<K, V> SimpleStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub fn new(size_hint: usize) -> Self {
        Self {
            entries: HashMap::with_capacity(size_hint),
        }
    }
}

impl<K, V> EvictionStore<K, V> for SimpleStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        self.entries.insert(key, CacheEntry::new(value, expires_at));
        None
    }

    fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        self.entries.get(key)
    }

    fn touch(&mut self, _key: &K) {}

    fn remove(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    fn iter(&self) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_> {
        Box::new(self.entries.iter())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }

    fn clear(&mut self) -> Vec<(K, V)> {
        self.entries
            .drain()
            .map(|(key, entry)| (key, entry.value))
            .collect()
    }
}
