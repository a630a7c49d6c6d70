//! Flightcache - an in-process cache engine
//!
//! Interchangeable eviction policies (simple, LRU, LFU, ARC) behind one
//! API, per-entry TTL, and single-flight loading so concurrent misses on a
//! key run the loader once.

pub mod cache;
pub mod clock;
pub mod config;
pub mod error;
pub mod tasks;

pub use cache::{Cache, CacheBuilder, EvictionPolicy, StatsSnapshot};
pub use clock::{Clock, FakeClock, RealClock};
pub use config::CacheConfig;
pub use error::{CacheError, Result};
pub use tasks::spawn_cleanup_task;
