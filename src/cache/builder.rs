//! Cache Builder Module
//!
//! Collects construction-time options and produces a [`Cache`].

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::eviction::EvictionPolicy;
use crate::cache::store::{Hooks, Loader};
use crate::cache::Cache;
use crate::clock::{Clock, RealClock};
use crate::config::CacheConfig;
use crate::error::{CacheError, Result};

// == Cache Builder ==
/// Builder for [`Cache`].
///
/// ```
/// use std::time::Duration;
/// use flightcache::CacheBuilder;
///
/// let cache = CacheBuilder::new(100)
///     .arc()
///     .default_ttl(Duration::from_secs(30))
///     .loader(|key: &u64| Ok(key * 2))
///     .build()
///     .unwrap();
///
/// assert_eq!(cache.get(&21).unwrap(), 42);
/// ```
pub struct CacheBuilder<K, V> {
    policy: EvictionPolicy,
    size: usize,
    default_ttl: Option<Duration>,
    clock: Arc<dyn Clock>,
    loader: Option<Loader<K, V>>,
    hooks: Hooks<K, V>,
}

impl<K, V> CacheBuilder<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Starts an LRU cache holding at most `size` entries.
    ///
    /// A size of 0 means unbounded for every policy except ARC.
    pub fn new(size: usize) -> Self {
        Self {
            policy: EvictionPolicy::default(),
            size,
            default_ttl: None,
            clock: Arc::new(RealClock::new()),
            loader: None,
            hooks: Hooks::default(),
        }
    }

    /// Starts a builder from loaded configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        let builder = Self::new(config.size).policy(config.policy);
        match config.default_ttl {
            Some(ttl) => builder.default_ttl(ttl),
            None => builder,
        }
    }

    // == Policy Selection ==
    pub fn policy(mut self, policy: EvictionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn simple(self) -> Self {
        self.policy(EvictionPolicy::Simple)
    }

    pub fn lru(self) -> Self {
        self.policy(EvictionPolicy::Lru)
    }

    pub fn lfu(self) -> Self {
        self.policy(EvictionPolicy::Lfu)
    }

    pub fn arc(self) -> Self {
        self.policy(EvictionPolicy::Arc)
    }

    // == Expiration ==
    /// TTL applied when a value is stored without one. Zero disables it.
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl).filter(|ttl| !ttl.is_zero());
        self
    }

    /// Replaces the time source, mainly for tests.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    // == Loading ==
    /// Loader invoked on a miss; loaded values use the default TTL.
    pub fn loader<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(move |key: &K| {
            loader(key).map(|value| (value, None))
        }));
        self
    }

    /// Loader that also chooses the TTL of each loaded value.
    ///
    /// Returning `None` (or a zero duration) uses the default TTL.
    pub fn loader_with_ttl<F>(mut self, loader: F) -> Self
    where
        F: Fn(&K) -> anyhow::Result<(V, Option<Duration>)> + Send + Sync + 'static,
    {
        self.loader = Some(Arc::new(loader));
        self
    }

    // == Callbacks ==
    pub fn on_add<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.hooks.on_add = Some(Arc::new(callback));
        self
    }

    /// Fires when [`Cache::remove`] deletes an entry.
    pub fn on_delete<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.hooks.on_delete = Some(Arc::new(callback));
        self
    }

    /// Fires when the policy evicts an entry or an expired entry is dropped.
    pub fn on_evict<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.hooks.on_evict = Some(Arc::new(callback));
        self
    }

    /// Fires once per entry removed by [`Cache::purge`].
    pub fn on_purge<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K, &V) + Send + Sync + 'static,
    {
        self.hooks.on_purge = Some(Arc::new(callback));
        self
    }

    pub fn on_miss<F>(mut self, callback: F) -> Self
    where
        F: Fn(&K) + Send + Sync + 'static,
    {
        self.hooks.on_miss = Some(Arc::new(callback));
        self
    }

    // == Value Transforms ==
    /// Transform applied to every value before it is stored.
    pub fn serialize_with<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.hooks.serialize_with = Some(Arc::new(transform));
        self
    }

    /// Transform applied to every stored value before it is returned.
    pub fn deserialize_with<F>(mut self, transform: F) -> Self
    where
        F: Fn(&K, V) -> anyhow::Result<V> + Send + Sync + 'static,
    {
        self.hooks.deserialize_with = Some(Arc::new(transform));
        self
    }

    // == Build ==
    pub fn build(self) -> Result<Cache<K, V>> {
        if self.policy == EvictionPolicy::Arc && self.size == 0 {
            return Err(CacheError::InvalidConfig(
                "ARC cache requires a size greater than 0".to_string(),
            ));
        }

        Ok(Cache::from_parts(
            self.policy,
            self.size,
            self.clock,
            self.default_ttl,
            self.loader,
            self.hooks,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_lru() {
        let cache: Cache<u32, u32> = CacheBuilder::new(2).build().unwrap();
        assert_eq!(cache.policy(), EvictionPolicy::Lru);
    }

    #[test]
    fn test_arc_requires_size() {
        let result: Result<Cache<u32, u32>> = CacheBuilder::new(0).arc().build();
        assert!(matches!(result, Err(CacheError::InvalidConfig(_))));
    }

    #[test]
    fn test_zero_size_lru_is_unbounded() {
        let cache: Cache<u32, u32> = CacheBuilder::new(0).lru().build().unwrap();
        for i in 0..100 {
            cache.set(i, i).unwrap();
        }
        assert_eq!(cache.len(false), 100);
    }

    #[test]
    fn test_from_config() {
        let config = CacheConfig {
            policy: EvictionPolicy::Lfu,
            size: 3,
            default_ttl: Some(Duration::from_secs(5)),
            ..CacheConfig::default()
        };
        let cache: Cache<u32, u32> = CacheBuilder::from_config(&config).build().unwrap();

        assert_eq!(cache.policy(), EvictionPolicy::Lfu);
        for i in 0..10 {
            cache.set(i, i).unwrap();
        }
        assert_eq!(cache.len(false), 3);
    }

    #[test]
    fn test_loader_with_ttl_is_used() {
        let cache: Cache<u32, String> = CacheBuilder::new(4)
            .loader_with_ttl(|key: &u32| Ok((format!("v{}", key), Some(Duration::from_secs(1)))))
            .build()
            .unwrap();

        assert_eq!(cache.get(&7).unwrap(), "v7");
        assert!(cache.has(&7));
    }
}
