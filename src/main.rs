//! Flightcache demo
//!
//! Builds a cache from environment configuration, then fires a burst of
//! concurrent lookups for the same cold key to show that the slow loader
//! runs once while every caller gets the value.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use flightcache::{spawn_cleanup_task, CacheBuilder, CacheConfig};

const CALLERS: usize = 16;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "flightcache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: policy={}, size={}, default_ttl={:?}, cleanup_interval={:?}",
        config.policy, config.size, config.default_ttl, config.cleanup_interval
    );

    let loads = Arc::new(AtomicUsize::new(0));
    let loader_loads = loads.clone();
    let cache = CacheBuilder::<String, String>::from_config(&config)
        .loader(move |key: &String| {
            loader_loads.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(50));
            Ok(format!("value-for-{}", key))
        })
        .on_evict(|key, _| info!(%key, "entry evicted"))
        .build()
        .context("building cache from configuration")?;
    let cache = Arc::new(cache);

    let cleanup_handle = spawn_cleanup_task(cache.clone(), config.cleanup_interval);

    let lookups: Vec<_> = (0..CALLERS)
        .map(|_| {
            let cache = cache.clone();
            tokio::task::spawn_blocking(move || cache.get(&"hot-key".to_string()))
        })
        .collect();

    for lookup in lookups {
        let value = lookup.await.context("lookup task panicked")??;
        info!(%value, "lookup finished");
    }

    let stats = cache.stats();
    info!(
        "{} callers, {} loader calls, hits={}, misses={}, hit_rate={:.2}",
        CALLERS,
        loads.load(Ordering::SeqCst),
        stats.hit_count,
        stats.miss_count,
        stats.hit_rate()
    );

    cleanup_handle.abort();
    Ok(())
}
