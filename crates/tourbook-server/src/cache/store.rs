//! The cache store contract and its error type.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

/// Cached payload. Wrapped in `Arc` so hits are cheap to hand out.
pub type CacheValue = Arc<Vec<u8>>;

/// Lazy stream of keys produced by [`CacheStore::find_keys`].
pub type KeyStream<'a> = BoxStream<'a, Result<String, CacheError>>;

/// Shareable cache store handle.
pub type DynCacheStore = Arc<dyn CacheStore>;

/// Errors raised by cache stores.
///
/// A logical miss is never an error; `get` returns `Ok(None)` for it.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The backend could not be reached or rejected the command.
    #[error("cache transport error: {message}")]
    Transport { message: String },

    /// The backend did not answer within the operation timeout.
    #[error("cache {operation} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// A key pattern could not be compiled.
    #[error("invalid cache pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// A cached payload could not be encoded or decoded.
    #[error("cache codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl CacheError {
    /// Creates a new `Transport` error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Returns `true` for errors caused by the backend being unavailable.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Timeout { .. })
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        Self::transport(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for CacheError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        Self::transport(format!("failed to get Redis connection: {err}"))
    }
}

/// Key/value store with per-key TTL, pattern enumeration and bulk deletion.
///
/// The store is a process-wide shared resource: any component may read, write
/// or invalidate any key. Operations on the same key are last-write-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the live value for `key`, or `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<CacheValue>, CacheError>;

    /// Stores `value` under `key`, replacing any previous value and restarting
    /// its expiry countdown.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError>;

    /// Resets the expiry of an existing key to `ttl` without touching its value.
    /// Absent keys are ignored.
    async fn refresh_ttl(&self, key: &str, ttl: Duration) -> Result<(), CacheError>;

    /// Enumerates live keys matching a glob `pattern`.
    ///
    /// The stream is lazy and finite, each call starts a fresh enumeration,
    /// and no key is yielded twice within one enumeration.
    fn find_keys<'a>(&'a self, pattern: &'a str) -> KeyStream<'a>;

    /// Deletes `keys` and returns how many existed. Missing keys are not errors.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, CacheError>;

    /// Drops expired entries the backend does not expire on its own.
    async fn purge_expired(&self) -> Result<u64, CacheError> {
        Ok(0)
    }

    /// Returns the name of this backend for logging and metrics.
    fn backend_name(&self) -> &'static str;
}
