//! Cache-aside reads with sliding expiration.
//!
//! A hit refreshes the entry's TTL and is returned without touching the
//! record store. A miss hands the caller a [`Miss`] token carrying the
//! derived key; the caller computes the value and passes it back through
//! [`CacheAside::populate`].
//!
//! The accessor fails open: a cache that is down or slow turns every lookup
//! into a miss and every write into a no-op, so reads degrade to the record
//! store instead of failing.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::stale::StalePatterns;
use super::store::{CacheValue, DynCacheStore};
use crate::metrics;

/// Outcome of a cache-aside lookup.
#[derive(Debug)]
pub enum Lookup {
    Hit(CacheValue),
    Miss(Miss),
}

/// Token returned on a miss; pass it to [`CacheAside::populate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Miss {
    key: String,
    bypass: bool,
}

impl Miss {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// `true` when the key is covered by a stale pattern and the computed
    /// value must not be cached.
    pub fn is_bypass(&self) -> bool {
        self.bypass
    }
}

/// Read-through accessor for one family of cached values.
pub struct CacheAside<C: ?Sized> {
    store: DynCacheStore,
    ttl: Duration,
    derive_key: Arc<dyn Fn(&C) -> String + Send + Sync>,
    stale: Option<StalePatterns>,
}

impl<C: ?Sized> Clone for CacheAside<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            ttl: self.ttl,
            derive_key: self.derive_key.clone(),
            stale: self.stale.clone(),
        }
    }
}

impl<C: ?Sized> fmt::Debug for CacheAside<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheAside")
            .field("backend", &self.store.backend_name())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl<C: ?Sized> CacheAside<C> {
    pub fn new<F>(store: DynCacheStore, ttl: Duration, derive_key: F) -> Self
    where
        F: Fn(&C) -> String + Send + Sync + 'static,
    {
        Self {
            store,
            ttl,
            derive_key: Arc::new(derive_key),
            stale: None,
        }
    }

    /// Bypass keys covered by patterns registered in `stale`.
    pub fn with_stale_patterns(mut self, stale: StalePatterns) -> Self {
        self.stale = Some(stale);
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The cache key for `ctx`.
    pub fn key_for(&self, ctx: &C) -> String {
        (self.derive_key)(ctx)
    }

    /// Looks up the value for `ctx`.
    pub async fn lookup(&self, ctx: &C) -> Lookup {
        self.lookup_key(self.key_for(ctx)).await
    }

    /// Looks up `key` directly.
    pub async fn lookup_key(&self, key: String) -> Lookup {
        if self.is_stale(&key) {
            metrics::record_cache_bypass();
            tracing::debug!(key = %key, "cache bypass (stale pattern)");
            return Lookup::Miss(Miss { key, bypass: true });
        }

        let backend = self.store.backend_name();
        match self.store.get(&key).await {
            Ok(Some(value)) => {
                if let Err(e) = self.store.refresh_ttl(&key, self.ttl).await {
                    metrics::record_cache_error("refresh_ttl");
                    tracing::warn!(key = %key, error = %e, "failed to refresh cache TTL");
                }
                metrics::record_cache_hit(backend);
                tracing::debug!(key = %key, "cache hit");
                Lookup::Hit(value)
            }
            Ok(None) => {
                metrics::record_cache_miss(backend);
                tracing::debug!(key = %key, "cache miss");
                Lookup::Miss(Miss { key, bypass: false })
            }
            Err(e) => {
                metrics::record_cache_error("get");
                metrics::record_cache_miss(backend);
                tracing::warn!(key = %key, error = %e, "cache lookup failed, reading through");
                Lookup::Miss(Miss { key, bypass: false })
            }
        }
    }

    /// Stores a freshly computed value for a miss. Failures are logged and
    /// swallowed.
    pub async fn populate(&self, miss: &Miss, value: Vec<u8>) {
        // An invalidation may have failed while the value was computed.
        if miss.bypass || self.is_stale(&miss.key) {
            return;
        }
        if let Err(e) = self.store.set(&miss.key, value, self.ttl).await {
            metrics::record_cache_error("set");
            tracing::warn!(key = %miss.key, error = %e, "failed to populate cache");
        }
    }

    /// Full read-through with JSON encoding.
    ///
    /// Returns the cached value when present and decodable; otherwise runs
    /// `compute`, caches its result and returns it. Errors from `compute`
    /// are returned unchanged and nothing is cached.
    pub async fn fetch<T, E, F, Fut>(&self, ctx: &C, compute: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let key = self.key_for(ctx);
        let miss = match self.lookup_key(key.clone()).await {
            Lookup::Hit(bytes) => {
                match serde_json::from_slice::<T>(&bytes) {
                    Ok(value) => return Ok(value),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "discarding undecodable cache entry");
                        if let Err(e) = self.store.delete_many(std::slice::from_ref(&key)).await {
                            metrics::record_cache_error("del");
                            tracing::warn!(key = %key, error = %e, "failed to drop cache entry");
                        }
                        Miss { key, bypass: false }
                    }
                }
            }
            Lookup::Miss(miss) => miss,
        };

        let value = compute().await?;
        match serde_json::to_vec(&value) {
            Ok(bytes) => self.populate(&miss, bytes).await,
            Err(e) => tracing::warn!(key = %miss.key, error = %e, "failed to encode cache entry"),
        }
        Ok(value)
    }

    fn is_stale(&self, key: &str) -> bool {
        self.stale.as_ref().is_some_and(|stale| stale.covers(key))
    }
}
