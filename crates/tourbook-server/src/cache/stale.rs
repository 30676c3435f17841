//! Registry of patterns whose last invalidation failed.
//!
//! While a pattern is registered, cache-aside reads for keys it covers go
//! straight to the record store and are not populated, so a failed
//! invalidation cannot leave readers on data older than the last write.

use std::sync::Arc;

use dashmap::DashMap;

use super::pattern::GlobPattern;

/// Shared set of stale patterns.
#[derive(Clone, Debug, Default)]
pub struct StalePatterns {
    patterns: Arc<DashMap<String, GlobPattern>>,
}

impl StalePatterns {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `pattern`. Patterns that do not compile cannot match any
    /// key and are ignored.
    pub fn mark(&self, pattern: &str) {
        if self.patterns.contains_key(pattern) {
            return;
        }
        match GlobPattern::new(pattern) {
            Ok(glob) => {
                self.patterns.insert(pattern.to_string(), glob);
                tracing::warn!(pattern = %pattern, "cache pattern marked stale");
            }
            Err(e) => tracing::debug!(error = %e, "not marking uncompilable pattern stale"),
        }
    }

    /// Removes `pattern` from the registry.
    pub fn clear(&self, pattern: &str) {
        if self.patterns.remove(pattern).is_some() {
            tracing::info!(pattern = %pattern, "stale cache pattern cleared");
        }
    }

    /// Returns `true` when any registered pattern matches `key`.
    pub fn covers(&self, key: &str) -> bool {
        self.patterns.iter().any(|entry| entry.value().matches(key))
    }

    /// Snapshot of the registered patterns, sorted.
    pub fn patterns(&self) -> Vec<String> {
        let mut patterns: Vec<String> = self.patterns.iter().map(|e| e.key().clone()).collect();
        patterns.sort_unstable();
        patterns
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
