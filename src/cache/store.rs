//! Cache Store Module
//!
//! Main cache engine: binds an eviction store, a clock, statistics and the
//! load group into the public cache API.
//!
//! All structural state sits behind one mutex. The loader and every user
//! callback run with that mutex released, so a slow loader never blocks
//! unrelated keys and a callback may safely call back into the cache.

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::cache::eviction::{EvictionPolicy, EvictionStore, PolicyStore};
use crate::cache::load_group::{LoadGroup, Wait};
use crate::cache::stats::{CacheStats, StatsSnapshot};
use crate::clock::Clock;
use crate::error::{CacheError, Result};

/// Callback receiving a key and its value.
pub type EntryCallback<K, V> = Arc<dyn Fn(&K, &V) + Send + Sync>;
/// Callback receiving a key only.
pub type KeyCallback<K> = Arc<dyn Fn(&K) + Send + Sync>;
/// Value transform applied on the way into or out of the store.
pub type Transform<K, V> = Arc<dyn Fn(&K, V) -> anyhow::Result<V> + Send + Sync>;
/// Produces the value for a missing key, with an optional per-key TTL.
pub type Loader<K, V> = Arc<dyn Fn(&K) -> anyhow::Result<(V, Option<Duration>)> + Send + Sync>;

// == Hooks ==
/// User supplied callbacks and value transforms.
pub(crate) struct Hooks<K, V> {
    pub(crate) on_add: Option<EntryCallback<K, V>>,
    pub(crate) on_delete: Option<EntryCallback<K, V>>,
    pub(crate) on_evict: Option<EntryCallback<K, V>>,
    pub(crate) on_purge: Option<EntryCallback<K, V>>,
    pub(crate) on_miss: Option<KeyCallback<K>>,
    pub(crate) serialize_with: Option<Transform<K, V>>,
    pub(crate) deserialize_with: Option<Transform<K, V>>,
}

impl<K, V> Default for Hooks<K, V> {
    fn default() -> Self {
        Self {
            on_add: None,
            on_delete: None,
            on_evict: None,
            on_purge: None,
            on_miss: None,
            serialize_with: None,
            deserialize_with: None,
        }
    }
}

/// Runs a user callback, containing any panic it raises.
fn notify(event: &'static str, callback: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(callback)).is_err() {
        warn!(event, "cache callback panicked; cache state is unaffected");
    }
}

// == Cache ==
/// Thread-safe cache with a fixed eviction policy.
///
/// Build one with [`CacheBuilder`](crate::CacheBuilder):
///
/// ```
/// use flightcache::CacheBuilder;
///
/// let cache = CacheBuilder::new(2).lru().build().unwrap();
/// cache.set("a", 1).unwrap();
/// cache.set("b", 2).unwrap();
/// assert_eq!(cache.get(&"a").unwrap(), 1);
/// cache.set("c", 3).unwrap();
/// assert!(!cache.has(&"b"));
/// ```
pub struct Cache<K, V> {
    store: Mutex<PolicyStore<K, V>>,
    load_group: LoadGroup<K, V>,
    stats: CacheStats,
    clock: Arc<dyn Clock>,
    default_ttl: Option<Duration>,
    loader: Option<Loader<K, V>>,
    hooks: Hooks<K, V>,
}

impl<K, V> Cache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub(crate) fn from_parts(
        policy: EvictionPolicy,
        size: usize,
        clock: Arc<dyn Clock>,
        default_ttl: Option<Duration>,
        loader: Option<Loader<K, V>>,
        hooks: Hooks<K, V>,
    ) -> Self {
        Self {
            store: Mutex::new(PolicyStore::new(policy, size)),
            load_group: LoadGroup::new(),
            stats: CacheStats::new(),
            clock,
            default_ttl,
            loader,
            hooks,
        }
    }

    // == Set ==
    /// Stores a value using the default TTL.
    pub fn set(&self, key: K, value: V) -> Result<()> {
        self.insert(key, value, None)
    }

    /// Stores a value that expires after `ttl`.
    ///
    /// A zero `ttl` falls back to the default TTL.
    pub fn set_with_ttl(&self, key: K, value: V, ttl: Duration) -> Result<()> {
        self.insert(key, value, Some(ttl))
    }

    fn insert(&self, key: K, value: V, ttl: Option<Duration>) -> Result<()> {
        let stored = self.serialize(&key, value)?;
        self.install(key, stored, ttl);
        Ok(())
    }

    /// Stores an already serialized value and fires the resulting callbacks.
    fn install(&self, key: K, stored: V, ttl: Option<Duration>) {
        let expires_at = self.expiry_for(ttl);
        let added = self
            .hooks
            .on_add
            .as_ref()
            .map(|_| (key.clone(), stored.clone()));

        let victim = self.store.lock().insert(key, stored, expires_at);

        if let Some((victim_key, victim_value)) = victim {
            self.evicted(&victim_key, &victim_value);
        }
        if let (Some(on_add), Some((key, value))) = (&self.hooks.on_add, added) {
            notify("add", || on_add(&key, &value));
        }
    }

    /// Absolute expiry for an explicit TTL, falling back to the default.
    fn expiry_for(&self, ttl: Option<Duration>) -> Option<Instant> {
        let ttl = ttl.filter(|ttl| !ttl.is_zero()).or(self.default_ttl)?;
        // An instant past the end of the clock's range never expires.
        self.clock.now().checked_add(ttl)
    }

    // == Get ==
    /// Returns the live value for `key`, loading it on a miss when a loader
    /// is configured.
    ///
    /// Concurrent misses on the same key share a single loader call; this
    /// blocks until that call finishes. A loaded value goes through both
    /// value transforms, so it reads the same as a later hit.
    pub fn get(&self, key: &K) -> Result<V> {
        self.get_with(key, Wait::Block)
    }

    /// Like [`Cache::get`], but fails with [`CacheError::StillLoading`]
    /// instead of waiting for another caller's load.
    pub fn try_get(&self, key: &K) -> Result<V> {
        self.get_with(key, Wait::NoWait)
    }

    /// Like [`Cache::get`], but waits at most `timeout` for another
    /// caller's load. The load itself keeps running.
    pub fn get_timeout(&self, key: &K, timeout: Duration) -> Result<V> {
        self.get_with(key, Wait::timeout(timeout))
    }

    /// Returns the live value for `key` without ever invoking the loader.
    pub fn get_if_present(&self, key: &K) -> Result<V> {
        match self.lookup(key) {
            Some(value) => self.deserialize(key, value),
            None => Err(CacheError::KeyNotFound),
        }
    }

    fn get_with(&self, key: &K, wait: Wait) -> Result<V> {
        if let Some(value) = self.lookup(key) {
            return self.deserialize(key, value);
        }
        let loader = self.loader.as_ref().ok_or(CacheError::KeyNotFound)?;

        let (value, shared) = self
            .load_group
            .run(key, wait, || self.load(key, loader))?;
        if shared {
            debug!("miss served by another caller's load");
        }
        Ok(value)
    }

    /// Producer body run by the load group leader.
    fn load(&self, key: &K, loader: &Loader<K, V>) -> Result<V> {
        // A load that finished between our miss and claiming the call has
        // already installed the value.
        if let Some(value) = self.peek_live(key) {
            return self.deserialize(key, value);
        }

        let (value, ttl) = loader(key).map_err(CacheError::loader)?;
        debug!("loader produced a value");
        // Hand back what a later hit would read, not the raw loader output.
        let stored = self.serialize(key, value)?;
        self.install(key.clone(), stored.clone(), ttl);
        self.deserialize(key, stored)
    }

    /// Hit/miss bookkeeping shared by every read path.
    fn lookup(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let (hit, expired) = {
            let mut store = self.store.lock();
            match store.peek(key).map(|entry| entry.is_expired(now)) {
                Some(false) => {
                    store.touch(key);
                    (store.peek(key).map(|entry| entry.value.clone()), None)
                }
                Some(true) => (None, store.expire(key)),
                None => (None, None),
            }
        };

        if hit.is_some() {
            self.stats.record_hit();
            return hit;
        }

        self.stats.record_miss();
        if let Some(value) = expired {
            self.evicted(key, &value);
        }
        if let Some(on_miss) = &self.hooks.on_miss {
            notify("miss", || on_miss(key));
        }
        None
    }

    fn peek_live(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let store = self.store.lock();
        store
            .peek(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    // == Has ==
    /// Returns true if `key` holds a live value. Does not count as an access.
    pub fn has(&self, key: &K) -> bool {
        let now = self.clock.now();
        self.store
            .lock()
            .peek(key)
            .is_some_and(|entry| !entry.is_expired(now))
    }

    // == Remove ==
    /// Removes `key`, returning whether it was stored.
    pub fn remove(&self, key: &K) -> bool {
        let removed = self.store.lock().remove(key);
        match removed {
            Some(value) => {
                if let Some(on_delete) = &self.hooks.on_delete {
                    notify("delete", || on_delete(key, &value));
                }
                true
            }
            None => false,
        }
    }

    // == Purge ==
    /// Removes every entry and resets policy state.
    ///
    /// The purge callback fires once per removed entry.
    pub fn purge(&self) {
        let drained = self.store.lock().clear();
        if drained.is_empty() {
            return;
        }
        debug!(entries = drained.len(), "cache purged");
        if let Some(on_purge) = &self.hooks.on_purge {
            for (key, value) in &drained {
                notify("purge", || on_purge(key, value));
            }
        }
    }

    /// Removes every expired entry, returning how many were removed.
    ///
    /// Each removal counts as an eviction and fires the eviction callback.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let removed: Vec<(K, V)> = {
            let mut store = self.store.lock();
            let expired: Vec<K> = store
                .iter()
                .filter(|(_, entry)| entry.is_expired(now))
                .map(|(key, _)| key.clone())
                .collect();
            expired
                .into_iter()
                .filter_map(|key| store.expire(&key).map(|value| (key, value)))
                .collect()
        };

        for (key, value) in &removed {
            self.evicted(key, value);
        }
        removed.len()
    }

    // == Enumeration ==
    /// Keys currently stored. With `check_expired`, expired keys are left out.
    pub fn keys(&self, check_expired: bool) -> Vec<K> {
        let now = self.clock.now();
        let store = self.store.lock();
        store
            .enumerate(now, !check_expired)
            .map(|(key, _)| key.clone())
            .collect()
    }

    /// Number of stored entries. With `check_expired`, expired entries are
    /// not counted.
    pub fn len(&self, check_expired: bool) -> usize {
        let now = self.clock.now();
        let store = self.store.lock();
        if check_expired {
            store.enumerate(now, false).count()
        } else {
            store.len()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len(true) == 0
    }

    /// Snapshot of stored entries. With `check_expired`, expired entries are
    /// left out.
    ///
    /// Values go through the deserialize hook; entries it rejects are
    /// skipped and logged.
    pub fn get_all(&self, check_expired: bool) -> HashMap<K, V> {
        let now = self.clock.now();
        let snapshot: Vec<(K, V)> = {
            let store = self.store.lock();
            store
                .enumerate(now, !check_expired)
                .map(|(key, entry)| (key.clone(), entry.value.clone()))
                .collect()
        };

        snapshot
            .into_iter()
            .filter_map(|(key, value)| match self.deserialize(&key, value) {
                Ok(value) => Some((key, value)),
                Err(err) => {
                    warn!(error = %err, "skipping entry rejected by deserialize hook");
                    None
                }
            })
            .collect()
    }

    // == Stats ==
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.store.lock().policy()
    }

    /// Number of keys with a loader call in flight.
    pub fn loads_in_flight(&self) -> usize {
        self.load_group.in_flight()
    }

    fn evicted(&self, key: &K, value: &V) {
        self.stats.record_eviction();
        if let Some(on_evict) = &self.hooks.on_evict {
            notify("evict", || on_evict(key, value));
        }
    }

    fn serialize(&self, key: &K, value: V) -> Result<V> {
        match &self.hooks.serialize_with {
            Some(transform) => transform(key, value).map_err(CacheError::serialization),
            None => Ok(value),
        }
    }

    fn deserialize(&self, key: &K, value: V) -> Result<V> {
        match &self.hooks.deserialize_with {
            Some(transform) => transform(key, value).map_err(CacheError::serialization),
            None => Ok(value),
        }
    }
}

impl<K, V> fmt::Debug for Cache<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("clock", &self.clock)
            .field("default_ttl", &self.default_ttl)
            .field("has_loader", &self.loader.is_some())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
