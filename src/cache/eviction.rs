//! Eviction Store Module
//!
//! The contract every eviction policy implements, and the closed set of
//! policies a cache can be built with.

use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::cache::{ArcStore, CacheEntry, LfuStore, LruStore, SimpleStore};
use crate::error::CacheError;

/// Borrowed view of one stored entry.
pub type EntryRef<'a, K, V> = (&'a K, &'a CacheEntry<V>);

// == Eviction Store Trait ==
/// Storage plus the ordering structure of one eviction policy.
///
/// Implementations are single-threaded; the cache serializes every call
/// behind its structural lock. None of the operations can fail.
pub trait EvictionStore<K, V> {
    /// Inserts or replaces `key`.
    ///
    /// When `key` is new and the store is full, exactly one victim is
    /// removed and returned.
    fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)>;

    /// Reads an entry without recording an access.
    fn peek(&self, key: &K) -> Option<&CacheEntry<V>>;

    /// Records an access to `key` for ordering purposes.
    fn touch(&mut self, key: &K);

    /// Removes `key` on request of the user.
    fn remove(&mut self, key: &K) -> Option<V>;

    /// Removes `key` because its TTL elapsed.
    fn expire(&mut self, key: &K) -> Option<V> {
        self.remove(key)
    }

    /// Every stored entry, expired or not.
    fn iter(&self) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_>;

    /// Stored entries, skipping expired ones unless `include_expired` is set.
    fn enumerate(
        &self,
        now: Instant,
        include_expired: bool,
    ) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_> {
        Box::new(
            self.iter()
                .filter(move |(_, entry)| include_expired || !entry.is_expired(now)),
        )
    }

    /// Number of physically stored entries, expired ones included.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Empties the store and resets all policy state.
    fn clear(&mut self) -> Vec<(K, V)>;
}

// == Eviction Policy ==
/// Which eviction strategy a cache uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicy {
    /// No eviction; size only pre-allocates
    Simple,
    /// Least recently used
    #[default]
    Lru,
    /// Least frequently used, ties broken by recency
    Lfu,
    /// Adaptive replacement cache
    Arc,
}

impl fmt::Display for EvictionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EvictionPolicy::Simple => "simple",
            EvictionPolicy::Lru => "lru",
            EvictionPolicy::Lfu => "lfu",
            EvictionPolicy::Arc => "arc",
        };
        f.write_str(name)
    }
}

impl FromStr for EvictionPolicy {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "simple" => Ok(EvictionPolicy::Simple),
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "arc" => Ok(EvictionPolicy::Arc),
            other => Err(CacheError::InvalidConfig(format!(
                "unknown eviction policy '{}'",
                other
            ))),
        }
    }
}

// == Policy Store ==
/// The store a cache was built with, chosen once at construction.
#[derive(Debug)]
pub(crate) enum PolicyStore<K, V> {
    Simple(SimpleStore<K, V>),
    Lru(LruStore<K, V>),
    Lfu(LfuStore<K, V>),
    Arc(ArcStore<K, V>),
}

impl<K, V> PolicyStore<K, V>
where
    K: Eq + Hash + Clone,
{
    pub(crate) fn new(policy: EvictionPolicy, size: usize) -> Self {
        match policy {
            EvictionPolicy::Simple => PolicyStore::Simple(SimpleStore::new(size)),
            EvictionPolicy::Lru => PolicyStore::Lru(LruStore::new(size)),
            EvictionPolicy::Lfu => PolicyStore::Lfu(LfuStore::new(size)),
            EvictionPolicy::Arc => PolicyStore::Arc(ArcStore::new(size)),
        }
    }

    pub(crate) fn policy(&self) -> EvictionPolicy {
        match self {
            PolicyStore::Simple(_) => EvictionPolicy::Simple,
            PolicyStore::Lru(_) => EvictionPolicy::Lru,
            PolicyStore::Lfu(_) => EvictionPolicy::Lfu,
            PolicyStore::Arc(_) => EvictionPolicy::Arc,
        }
    }
}

macro_rules! dispatch {
    ($self:ident, $store:ident => $body:expr) => {
        match $self {
            PolicyStore::Simple($store) => $body,
            PolicyStore::Lru($store) => $body,
            PolicyStore::Lfu($store) => $body,
            PolicyStore::Arc($store) => $body,
        }
    };
}

impl<K, V> EvictionStore<K, V> for PolicyStore<K, V>
where
    K: Eq + Hash + Clone,
{
    fn insert(&mut self, key: K, value: V, expires_at: Option<Instant>) -> Option<(K, V)> {
        dispatch!(self, store => store.insert(key, value, expires_at))
    }

    fn peek(&self, key: &K) -> Option<&CacheEntry<V>> {
        dispatch!(self, store => store.peek(key))
    }

    fn touch(&mut self, key: &K) {
        dispatch!(self, store => store.touch(key))
    }

    fn remove(&mut self, key: &K) -> Option<V> {
        dispatch!(self, store => store.remove(key))
    }

    fn expire(&mut self, key: &K) -> Option<V> {
        dispatch!(self, store => store.expire(key))
    }

    fn iter(&self) -> Box<dyn Iterator<Item = EntryRef<'_, K, V>> + '_> {
        dispatch!(self, store => store.iter())
    }

    fn len(&self) -> usize {
        dispatch!(self, store => store.len())
    }

    fn clear(&mut self) -> Vec<(K, V)> {
        dispatch!(self, store => store.clear())
    }
}
