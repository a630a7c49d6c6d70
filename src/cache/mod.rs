//! Cache Module
//!
//! Provides in-memory caching with pluggable eviction (simple, LRU, LFU,
//! ARC), TTL expiration and coalesced loading of missing keys.

mod arc;
mod builder;
mod entry;
mod eviction;
mod lfu;
mod load_group;
mod lru;
mod recency;
mod simple;
mod stats;
mod store;


// Re-export public types
pub use arc::ArcStore;
pub use builder::CacheBuilder;
pub use entry::CacheEntry;
pub use eviction::{EntryRef, EvictionPolicy, EvictionStore};
pub use lfu::LfuStore;
pub use load_group::{LoadGroup, Wait};
pub use lru::LruStore;
pub use recency::RecencyList;
pub use simple::SimpleStore;
pub use stats::{CacheStats, StatsSnapshot};
pub use store::{Cache, EntryCallback, KeyCallback, Loader, Transform};
