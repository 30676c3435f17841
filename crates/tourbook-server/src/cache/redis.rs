//! Redis-backed cache store.
//!
//! Shared across server instances. Every command, including acquiring a
//! pooled connection, is bounded by the configured operation timeout so a
//! slow Redis degrades into fast transport errors instead of stalled reads.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Connection, Pool};
use futures_util::stream::{self, StreamExt};
use redis::AsyncCommands;

use super::store::{CacheError, CacheStore, CacheValue, KeyStream};

/// Cache store on a deadpool-redis pool.
#[derive(Clone)]
pub struct RedisCacheStore {
    pool: Pool,
    op_timeout: Duration,
    scan_count: usize,
}

/// Cursor state carried between `SCAN` pages of one enumeration.
struct ScanState {
    cursor: u64,
    started: bool,
    page: VecDeque<String>,
    seen: HashSet<String>,
}

impl RedisCacheStore {
    pub fn new(pool: Pool, op_timeout: Duration, scan_count: usize) -> Self {
        Self {
            pool,
            op_timeout,
            scan_count: scan_count.max(1),
        }
    }

    /// Check if Redis answers `PING` (for health checks).
    pub async fn is_available(&self) -> bool {
        let result = self
            .with_timeout("ping", |mut conn| async move {
                let pong: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(pong)
            })
            .await;
        result.is_ok()
    }

    /// Runs `op` on a pooled connection, bounded by the operation timeout.
    async fn with_timeout<T, F, Fut>(&self, operation: &'static str, op: F) -> Result<T, CacheError>
    where
        F: FnOnce(Connection) -> Fut,
        Fut: Future<Output = Result<T, CacheError>>,
    {
        let work = async {
            let conn = self.pool.get().await?;
            op(conn).await
        };

        match tokio::time::timeout(self.op_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(CacheError::Timeout {
                operation,
                timeout: self.op_timeout,
            }),
        }
    }

    async fn scan_page(&self, pattern: &str, cursor: u64) -> Result<(u64, Vec<String>), CacheError> {
        let count = self.scan_count;
        self.with_timeout("scan", |mut conn| async move {
            let page: (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;
            Ok(page)
        })
        .await
    }

    /// Advances one enumeration, fetching the next `SCAN` page when the
    /// buffered one is drained.
    async fn next_key(
        &self,
        pattern: &str,
        mut state: ScanState,
    ) -> Result<Option<(String, ScanState)>, CacheError> {
        loop {
            if let Some(key) = state.page.pop_front() {
                // SCAN may return a key more than once across pages.
                if state.seen.insert(key.clone()) {
                    return Ok(Some((key, state)));
                }
                continue;
            }

            if state.started && state.cursor == 0 {
                return Ok(None);
            }

            let (next, keys) = self.scan_page(pattern, state.cursor).await?;
            state.started = true;
            state.cursor = next;
            state.page.extend(keys);
        }
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError> {
        self.with_timeout("get", |mut conn| async move {
            let data: Option<Vec<u8>> = conn.get(key).await?;
            Ok(data.map(Arc::new))
        })
        .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        // SET EX rejects 0; round sub-second TTLs up to the minimum.
        let ttl_secs = ttl.as_secs().max(1);
        self.with_timeout("set", |mut conn| async move {
            let () = conn.set_ex(key, value, ttl_secs).await?;
            Ok(())
        })
        .await?;
        tracing::debug!(key = %key, ttl_secs, "cache set");
        Ok(())
    }

    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError> {
        let ttl_secs = i64::try_from(ttl.as_secs().max(1)).unwrap_or(i64::MAX);
        self.with_timeout("expire", |mut conn| async move {
            // EXPIRE answers 0 for a missing key; that is not an error.
            let _applied: bool = conn.expire(key, ttl_secs).await?;
            Ok(())
        })
        .await
    }

    fn find_keys<'a>(&'a self, pattern: &'a str) -> KeyStream<'a> {
        let state = ScanState {
            cursor: 0,
            started: false,
            page: VecDeque::new(),
            seen: HashSet::new(),
        };

        stream::try_unfold(state, move |state| self.next_key(pattern, state)).boxed()
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let removed = self
            .with_timeout("del", |mut conn| async move {
                let mut cmd = redis::cmd("DEL");
                for key in keys {
                    cmd.arg(key);
                }
                let removed: u64 = cmd.query_async(&mut conn).await?;
                Ok(removed)
            })
            .await?;

        tracing::debug!(requested = keys.len(), removed, "cache keys deleted");
        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Address of a TCP listener that accepts connections and never answers.
#[cfg(test)]
pub(crate) async fn silent_listener() -> std::net::SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    addr
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CacheAside, Lookup};
    use std::time::Instant;

    const OP_TIMEOUT: Duration = Duration::from_millis(200);

    async fn silent_store() -> RedisCacheStore {
        let addr = silent_listener().await;
        let pool = deadpool_redis::Config::from_url(format!("redis://{addr}"))
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .unwrap();
        RedisCacheStore::new(pool, OP_TIMEOUT, 10)
    }

    #[tokio::test]
    async fn test_unanswered_command_times_out() {
        let store = silent_store().await;

        let started = Instant::now();
        let err = store.get("tours:item:1").await.unwrap_err();
        assert!(matches!(err, CacheError::Timeout { operation: "get", .. }));
        assert!(started.elapsed() < OP_TIMEOUT * 5);
        assert!(!store.is_available().await);
    }

    #[tokio::test]
    async fn test_timeout_fails_open_through_cache_aside() {
        let tours: CacheAside<str> = CacheAside::new(
            Arc::new(silent_store().await),
            Duration::from_secs(3600),
            |id: &str| format!("tours:item:{id}"),
        );

        let started = Instant::now();
        let lookup = tours.lookup("1").await;
        assert!(matches!(lookup, Lookup::Miss(_)));
        assert!(started.elapsed() < OP_TIMEOUT * 5);

        let value = tours
            .fetch("1", || async { Ok::<_, CacheError>(vec!["ongoing".to_string()]) })
            .await
            .unwrap();
        assert_eq!(value, vec!["ongoing".to_string()]);
    }
}
