//! Pattern-based cache invalidation.
//!
//! Every pattern is enumerated concurrently, the matches are merged into one
//! deduplicated set and removed with a single `delete_many`. When any
//! enumeration fails nothing is deleted: the patterns are registered in
//! [`StalePatterns`] so readers bypass the affected keys until a retry
//! succeeds.

use std::collections::BTreeSet;
use std::future::Future;

use futures_util::TryStreamExt;
use futures_util::future::try_join_all;

use super::stale::StalePatterns;
use super::store::{CacheError, DynCacheStore};
use crate::metrics;

/// Deletes every cached key matching a set of patterns.
#[derive(Clone)]
pub struct Invalidator {
    store: DynCacheStore,
    stale: StalePatterns,
}

impl Invalidator {
    pub fn new(store: DynCacheStore, stale: StalePatterns) -> Self {
        Self { store, stale }
    }

    /// The registry this invalidator marks on failure.
    pub fn stale_patterns(&self) -> &StalePatterns {
        &self.stale
    }

    /// Invalidates a single pattern.
    pub async fn invalidate(&self, pattern: &str) -> Result<u64, CacheError> {
        self.invalidate_all(&[pattern]).await
    }

    /// Invalidates the union of `patterns` and returns how many keys were
    /// actually removed.
    pub async fn invalidate_all<P>(&self, patterns: &[P]) -> Result<u64, CacheError>
    where
        P: AsRef<str>,
    {
        if patterns.is_empty() {
            return Ok(0);
        }

        let scans = patterns
            .iter()
            .map(|p| self.store.find_keys(p.as_ref()).try_collect::<Vec<String>>());

        let found = match try_join_all(scans).await {
            Ok(found) => found,
            Err(e) => {
                for pattern in patterns {
                    self.stale.mark(pattern.as_ref());
                }
                metrics::record_invalidation_failure();
                tracing::warn!(
                    patterns = ?patterns.iter().map(|p| p.as_ref()).collect::<Vec<&str>>(),
                    error = %e,
                    "cache invalidation failed during key enumeration"
                );
                return Err(e);
            }
        };

        let keys: BTreeSet<String> = found.into_iter().flatten().collect();
        let keys: Vec<String> = keys.into_iter().collect();

        let removed = match self.store.delete_many(&keys).await {
            Ok(removed) => removed,
            Err(e) => {
                for pattern in patterns {
                    self.stale.mark(pattern.as_ref());
                }
                metrics::record_invalidation_failure();
                tracing::warn!(error = %e, matched = keys.len(), "cache invalidation delete failed");
                return Err(e);
            }
        };

        for pattern in patterns {
            self.stale.clear(pattern.as_ref());
        }
        metrics::record_invalidation(removed);
        tracing::debug!(matched = keys.len(), removed, "cache invalidated");
        Ok(removed)
    }

    /// Runs the authoritative `write`, then invalidates `patterns`.
    ///
    /// The write result is returned as-is. An invalidation failure after a
    /// successful write is logged; the patterns stay marked stale until
    /// [`Invalidator::retry_stale`] clears them.
    pub async fn after_write<T, E, Fut>(&self, write: Fut, patterns: &[String]) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
    {
        let value = write.await?;
        if let Err(e) = self.invalidate_all(patterns).await {
            tracing::warn!(error = %e, "write succeeded but cache invalidation failed");
        }
        Ok(value)
    }

    /// Re-invalidates every stale pattern. Returns the number of keys removed.
    pub async fn retry_stale(&self) -> Result<u64, CacheError> {
        let patterns = self.stale.patterns();
        if patterns.is_empty() {
            return Ok(0);
        }
        tracing::info!(count = patterns.len(), "retrying stale cache invalidations");
        self.invalidate_all(&patterns).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::MemoryCacheStore;
    use crate::cache::store::{CacheStore, CacheValue, KeyStream};
    use async_trait::async_trait;
    use futures_util::stream::{self, StreamExt};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    const TTL: Duration = Duration::from_secs(3600);

    /// Wraps a store and fails enumeration while `down` is set.
    struct FlakyScan {
        inner: MemoryCacheStore,
        down: AtomicBool,
    }

    #[async_trait]
    impl CacheStore for FlakyScan {
        async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
            self.inner.get(key).await
        }
        async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
            self.inner.set(key, value, ttl).await
        }
        async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
            self.inner.refresh_ttl(key, ttl).await
        }
        fn find_keys<'a>(&'a self, pattern: &'a str) -> KeyStream<'a> {
            if self.down.load(Ordering::SeqCst) {
                stream::once(async { Err(CacheError::transport("connection refused")) }).boxed()
            } else {
                self.inner.find_keys(pattern)
            }
        }
        async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
            self.inner.delete_many(keys).await
        }
        fn backend_name(&self) -> &'static str {
            "flaky"
        }
    }

    async fn seed(store: &dyn CacheStore, keys: &[&str]) {
        for key in keys {
            store.set(key, b"{}".to_vec(), TTL).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_family_pattern_leaves_other_families() {
        let store = Arc::new(MemoryCacheStore::new());
        seed(store.as_ref(), &["tour:1", "tour:2", "hotel:1"]).await;
        let invalidator = Invalidator::new(store.clone(), StalePatterns::new());

        assert_eq!(invalidator.invalidate("tour:*").await.unwrap(), 2);
        assert!(store.get("tour:1").await.unwrap().is_none());
        assert!(store.get("tour:2").await.unwrap().is_none());
        assert!(store.get("hotel:1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_overlapping_patterns_delete_each_key_once() {
        let store = Arc::new(MemoryCacheStore::new());
        seed(
            store.as_ref(),
            &["user:1:profile", "user:1:settings", "user:2:profile", "user:3:avatar"],
        )
        .await;
        let invalidator = Invalidator::new(store.clone(), StalePatterns::new());

        let removed = invalidator
            .invalidate_all(&["user:1:*", "user:*:profile"])
            .await
            .unwrap();
        assert_eq!(removed, 3);
        assert!(store.get("user:3:avatar").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_no_match_and_empty_input() {
        let store = Arc::new(MemoryCacheStore::new());
        seed(store.as_ref(), &["hotel:1"]).await;
        let invalidator = Invalidator::new(store, StalePatterns::new());

        assert_eq!(invalidator.invalidate("tour:*").await.unwrap(), 0);
        assert_eq!(invalidator.invalidate_all::<&str>(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_enumeration_failure_deletes_nothing_and_marks_stale() {
        let store = Arc::new(FlakyScan {
            inner: MemoryCacheStore::new(),
            down: AtomicBool::new(true),
        });
        seed(store.as_ref(), &["tour:1"]).await;
        let stale = StalePatterns::new();
        let invalidator = Invalidator::new(store.clone(), stale.clone());

        let err = invalidator.invalidate("tour:*").await.unwrap_err();
        assert!(err.is_transport());
        assert!(store.get("tour:1").await.unwrap().is_some());
        assert!(stale.covers("tour:1"));

        store.down.store(false, Ordering::SeqCst);
        assert_eq!(invalidator.retry_stale().await.unwrap(), 1);
        assert!(stale.is_empty());
        assert!(store.get("tour:1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_after_write_runs_write_first_and_keeps_result() {
        let store = Arc::new(MemoryCacheStore::new());
        seed(store.as_ref(), &["tours:item:1"]).await;
        let invalidator = Invalidator::new(store.clone(), StalePatterns::new());

        let patterns = vec!["tours:*".to_string()];
        let written: Result<u32, String> = invalidator.after_write(async { Ok(7) }, &patterns).await;
        assert_eq!(written, Ok(7));
        assert!(store.get("tours:item:1").await.unwrap().is_none());

        seed(store.as_ref(), &["tours:item:1"]).await;
        let failed: Result<u32, String> = invalidator
            .after_write(async { Err("constraint violation".to_string()) }, &patterns)
            .await;
        assert!(failed.is_err());
        assert!(store.get("tours:item:1").await.unwrap().is_some());
    }
}
