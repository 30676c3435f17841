//! In-process cache store backed by `DashMap`.
//!
//! Used as the single-instance backend when Redis is disabled or unreachable,
//! and as the deterministic fake in tests (pair it with a `ManualClock`).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use time::OffsetDateTime;

use super::pattern::GlobPattern;
use super::store::{CacheError, CacheStore, CacheValue, KeyStream};
use crate::clock::{DynClock, SystemClock};

/// A cached entry with an absolute expiry.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: CacheValue,
    pub expires_at: OffsetDateTime,
}

impl CachedEntry {
    /// Create a new entry that expires `ttl` after `now`.
    pub fn new(data: Vec<u8>, now: OffsetDateTime, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            expires_at: now + ttl,
        }
    }

    /// An entry is live while its remaining TTL is strictly positive.
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now >= self.expires_at
    }
}

/// Local cache store. Expired entries are invisible to every operation and
/// are dropped lazily on access or by [`CacheStore::purge_expired`].
#[derive(Clone, Debug)]
pub struct MemoryCacheStore {
    entries: Arc<DashMap<String, CachedEntry>>,
    clock: DynClock,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryCacheStore {
    /// Create a store driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a store driven by `clock`.
    pub fn with_clock(clock: DynClock) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|entry| !entry.is_expired(now))
            .count()
    }

    /// Returns `true` when no live entry exists.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remaining TTL of `key`, if it is live.
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let entry = self.entries.get(key)?;
        if entry.is_expired(now) {
            return None;
        }
        (entry.expires_at - now).try_into().ok()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        let now = self.clock.now();
        let expired = match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => return Ok(Some(Arc::clone(&entry.data))),
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        let entry = CachedEntry::new(value, self.clock.now(), ttl);
        self.entries.insert(key.to_string(), entry);
        Ok(())
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let now = self.clock.now();
        if let Some(mut entry) = self.entries.get_mut(key) {
            if !entry.is_expired(now) {
                entry.expires_at = now + ttl;
            }
        }
        Ok(())
    }

    fn find_keys<'a>(&'a self, pattern: &'a str) -> KeyStream<'a> {
        let glob = match GlobPattern::new(pattern) {
            Ok(glob) => glob,
            Err(e) => return stream::once(async move { Err(e) }).boxed(),
        };

        let now = self.clock.now();
        let mut keys: Vec<String> = self
            .entries
            .iter()
            .filter(|entry| !entry.is_expired(now) && glob.matches(entry.key()))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort_unstable();

        stream::iter(keys.into_iter().map(Ok)).boxed()
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let removed = keys
            .iter()
            .filter_map(|key| self.entries.remove(key))
            .filter(|(_, entry)| !entry.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn purge_expired(&self) -> Result<u64, CacheError> {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        Ok(before.saturating_sub(self.entries.len()) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use futures_util::TryStreamExt;
    use time::macros::datetime;

    const HOUR: Duration = Duration::from_secs(3600);

    fn store() -> (MemoryCacheStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(datetime!(2026-08-01 10:00 UTC)));
        (MemoryCacheStore::with_clock(clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_get_set_overwrite() {
        let (cache, _) = store();
        assert_eq!(cache.get("tours:item:1").await.unwrap(), None);

        cache.set("tours:item:1", b"v1".to_vec(), HOUR).await.unwrap();
        cache.set("tours:item:1", b"v2".to_vec(), HOUR).await.unwrap();

        let value = cache.get("tours:item:1").await.unwrap();
        assert_eq!(value, Some(Arc::new(b"v2".to_vec())));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_expired_entries_are_absent_without_sweep() {
        let (cache, clock) = store();
        cache.set("k", b"v".to_vec(), HOUR).await.unwrap();

        clock.advance(Duration::from_secs(3599));
        assert!(cache.get("k").await.unwrap().is_some());

        clock.advance(Duration::from_secs(1));
        assert!(cache.get("k").await.unwrap().is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_refresh_ttl_extends_without_changing_value() {
        let (cache, clock) = store();
        cache.set("k", b"v".to_vec(), HOUR).await.unwrap();

        clock.advance(Duration::from_secs(3000));
        cache.refresh_ttl("k", HOUR).await.unwrap();
        assert_eq!(cache.ttl("k"), Some(HOUR));

        clock.advance(Duration::from_secs(3000));
        assert_eq!(
            cache.get("k").await.unwrap(),
            Some(Arc::new(b"v".to_vec()))
        );
    }

    #[tokio::test]
    async fn test_refresh_ttl_on_absent_key_is_noop() {
        let (cache, clock) = store();
        cache.refresh_ttl("missing", HOUR).await.unwrap();
        assert!(cache.get("missing").await.unwrap().is_none());

        cache.set("short", b"v".to_vec(), Duration::from_secs(5)).await.unwrap();
        clock.advance(Duration::from_secs(10));
        cache.refresh_ttl("short", HOUR).await.unwrap();
        assert!(cache.get("short").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_find_keys_matches_live_keys_only() {
        let (cache, clock) = store();
        cache.set("tour:1", b"a".to_vec(), HOUR).await.unwrap();
        cache.set("tour:2", b"b".to_vec(), HOUR).await.unwrap();
        cache.set("tour:3", b"c".to_vec(), Duration::from_secs(1)).await.unwrap();
        cache.set("hotel:1", b"d".to_vec(), HOUR).await.unwrap();
        clock.advance(Duration::from_secs(2));

        let keys: Vec<String> = cache.find_keys("tour:*").try_collect().await.unwrap();
        assert_eq!(keys, vec!["tour:1".to_string(), "tour:2".to_string()]);

        // Each call is a fresh enumeration.
        let again: Vec<String> = cache.find_keys("tour:*").try_collect().await.unwrap();
        assert_eq!(again, keys);
    }

    #[tokio::test]
    async fn test_find_keys_invalid_pattern_errors() {
        let (cache, _) = store();
        let result: Result<Vec<String>, _> = cache.find_keys("tour:[").try_collect().await;
        assert!(matches!(result, Err(CacheError::InvalidPattern { .. })));
    }

    #[tokio::test]
    async fn test_delete_many_counts_only_existing_keys() {
        let (cache, clock) = store();
        cache.set("a", b"1".to_vec(), HOUR).await.unwrap();
        cache.set("b", b"2".to_vec(), HOUR).await.unwrap();
        cache.set("stale", b"3".to_vec(), Duration::from_secs(1)).await.unwrap();
        clock.advance(Duration::from_secs(1));

        let removed = cache
            .delete_many(&[
                "a".to_string(),
                "a".to_string(),
                "missing".to_string(),
                "stale".to_string(),
            ])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("b").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (cache, clock) = store();
        cache.set("a", b"1".to_vec(), Duration::from_secs(10)).await.unwrap();
        cache.set("b", b"2".to_vec(), HOUR).await.unwrap();
        clock.advance(Duration::from_secs(60));

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.purge_expired().await.unwrap(), 0);
        assert_eq!(cache.len(), 1);
    }
}
