//! Storage traits for the record store abstraction.

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{LifecycleRecord, RecordFilter, RecordId, RecordPatch};

/// The storage contract consumed by the cache and reconciliation core.
///
/// The core never sees the schema or query language behind it; it only needs
/// predicate queries and partial updates by id. Implementations must be
/// thread-safe (`Send + Sync`) and each `update` must be atomic on its own.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns every record matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error only for infrastructure issues.
    async fn find_many(&self, filter: &RecordFilter) -> Result<Vec<LifecycleRecord>, StorageError>;

    /// Applies `patch` to the record with the given id and returns the result.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the record does not exist.
    async fn update(
        &self,
        id: RecordId,
        patch: &RecordPatch,
    ) -> Result<LifecycleRecord, StorageError>;

    /// Returns the name of this storage backend for logging/debugging.
    fn backend_name(&self) -> &'static str;
}
