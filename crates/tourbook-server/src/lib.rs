pub mod cache;
pub mod clock;
pub mod config;
pub mod jobs;
pub mod metrics;
pub mod observability;

pub use cache::{
    CacheAside, CacheError, CacheStore, DynCacheStore, Invalidator, Lookup, MemoryCacheStore,
    RedisCacheStore, ResourceKind, StalePatterns, create_cache_backend,
};
pub use clock::{Clock, DynClock, ManualClock, SystemClock};
pub use config::{AppConfig, CacheConfig, JobsConfig, RedisConfig, StorageBackend, StorageConfig};
pub use jobs::{
    CacheMaintenanceJob, JobError, JobReport, JobScheduler, JobSchedulerConfig, ScheduledJob,
    TourStatusReconciler,
};
pub use observability::init_tracing;

use tourbook_storage::{DynRecordStore, StorageError};

/// Create the record store selected by configuration.
pub async fn create_record_store(config: &StorageConfig) -> Result<DynRecordStore, StorageError> {
    match config.backend {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory record store");
            Ok(tourbook_db_memory::create_record_store())
        }
        StorageBackend::Postgres => {
            let pg = config.postgres.clone().ok_or_else(|| {
                StorageError::invalid_record("storage.backend=postgres requires storage.postgres")
            })?;
            tracing::info!(table = %pg.table, "Using PostgreSQL record store");
            tourbook_db_postgres::create_record_store(pg).await
        }
    }
}
