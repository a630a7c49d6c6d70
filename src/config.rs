//! Configuration Module
//!
//! Handles loading cache configuration from environment variables.

use std::env;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::EvictionPolicy;

/// Cache configuration parameters.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Eviction policy
    pub policy: EvictionPolicy,
    /// Maximum number of entries the cache can hold (0 = unbounded)
    pub size: usize,
    /// TTL for entries stored without one, None = never expire
    pub default_ttl: Option<Duration>,
    /// Interval of the background expired-entry sweep
    pub cleanup_interval: Duration,
}

impl CacheConfig {
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_POLICY` - `simple`, `lru`, `lfu` or `arc` (default: lru)
    /// - `CACHE_SIZE` - Maximum cache entries (default: 1000)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds, 0 = none (default: 0)
    /// - `CACHE_CLEANUP_INTERVAL_MS` - Cleanup frequency in milliseconds (default: 1000)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`CacheConfig::from_env`], reading variables through `lookup`.
    ///
    /// Missing or unparseable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |name: &str| {
            lookup(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_millis)
        };

        Self {
            policy: lookup("CACHE_POLICY")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.policy),
            size: lookup("CACHE_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.size),
            default_ttl: match millis("CACHE_DEFAULT_TTL_MS") {
                Some(ttl) if ttl.is_zero() => None,
                Some(ttl) => Some(ttl),
                None => defaults.default_ttl,
            },
            cleanup_interval: millis("CACHE_CLEANUP_INTERVAL_MS")
                .filter(|interval| !interval.is_zero())
                .unwrap_or(defaults.cleanup_interval),
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            policy: EvictionPolicy::Lru,
            size: 1000,
            default_ttl: None,
            cleanup_interval: Duration::from_secs(1),
        }
    }
}
