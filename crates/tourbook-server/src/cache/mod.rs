//! Shared cache for the booking read paths.
//!
//! ## Architecture
//!
//! - **Store**: [`CacheStore`] with two backends, Redis (shared across
//!   instances) and an in-process DashMap (single instance / fallback)
//! - **Cache-aside**: [`CacheAside`] serves hits with sliding expiration and
//!   hands misses back to the caller
//! - **Invalidation**: [`Invalidator`] removes every key matching a set of
//!   patterns in one batch after a write
//!
//! ```text
//! read  → CacheAside → CacheStore ──miss──→ record store → populate
//! write → record store → Invalidator → CacheStore (SCAN + DEL)
//! ```
//!
//! ## Graceful Degradation
//!
//! If Redis is unavailable or disabled, the server falls back to the local
//! store at startup. At runtime every cache error fails open: reads go to
//! the record store and writes are skipped.

pub mod aside;
pub mod invalidation;
pub mod keys;
pub mod memory;
pub mod pattern;
pub mod redis;
pub mod stale;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

pub use aside::{CacheAside, Lookup, Miss};
pub use invalidation::Invalidator;
pub use keys::ResourceKind;
pub use memory::{CachedEntry, MemoryCacheStore};
pub use pattern::GlobPattern;
pub use self::redis::RedisCacheStore;
pub use stale::StalePatterns;
pub use store::{CacheError, CacheStore, CacheValue, DynCacheStore, KeyStream};

use crate::clock::DynClock;
use crate::config::{CacheConfig, RedisConfig};

/// Create a cache store based on configuration.
///
/// ## Cache Modes
///
/// - **Redis disabled**: Returns the local store
/// - **Redis enabled**: Attempts to connect to Redis, falls back to local on failure
pub async fn create_cache_backend(
    redis: &RedisConfig,
    cache: &CacheConfig,
    clock: DynClock,
) -> DynCacheStore {
    if !redis.enabled {
        tracing::info!("Redis disabled, using local cache only");
        return Arc::new(MemoryCacheStore::with_clock(clock));
    }

    tracing::info!(url = %redis.url, "Connecting to Redis");

    let mut redis_config = deadpool_redis::Config::from_url(&redis.url);
    let timeout = Some(Duration::from_millis(redis.timeout_ms));
    let mut pool_config = redis_config
        .pool
        .take()
        .unwrap_or_else(|| deadpool_redis::PoolConfig::new(redis.pool_size));
    pool_config.max_size = redis.pool_size;
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    let pool = match redis_config.create_pool(Some(deadpool_redis::Runtime::Tokio1)) {
        Ok(pool) => pool,
        Err(e) => {
            tracing::warn!(
                error = %e,
                "Failed to create Redis pool. Falling back to local cache."
            );
            return Arc::new(MemoryCacheStore::with_clock(clock));
        }
    };

    let store = RedisCacheStore::new(pool, cache.operation_timeout(), cache.scan_count);
    if store.is_available().await {
        tracing::info!("Connected to Redis");
        Arc::new(store)
    } else {
        tracing::warn!(
            url = %redis.url,
            "Redis did not answer PING. Falling back to local cache."
        );
        Arc::new(MemoryCacheStore::with_clock(clock))
    }
}
