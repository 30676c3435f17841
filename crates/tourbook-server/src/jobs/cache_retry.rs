//! Cache maintenance: retries failed invalidations and sweeps expired
//! entries from backends that do not expire keys on their own.

use async_trait::async_trait;
use tokio::time::Instant;

use super::{JobError, JobReport, ScheduledJob};
use crate::cache::{DynCacheStore, Invalidator};

pub struct CacheMaintenanceJob {
    invalidator: Invalidator,
    store: DynCacheStore,
}

impl CacheMaintenanceJob {
    pub fn new(invalidator: Invalidator, store: DynCacheStore) -> Self {
        Self { invalidator, store }
    }
}

#[async_trait]
impl ScheduledJob for CacheMaintenanceJob {
    fn name(&self) -> &'static str {
        "cache_maintenance"
    }

    /// `updated` counts keys removed by retried invalidations, `unchanged`
    /// counts expired entries purged.
    ///
    /// Both steps only delete, so a run cut at the deadline leaves nothing
    /// inconsistent; unfinished patterns stay marked stale.
    async fn run(&self, deadline: Option<Instant>) -> Result<JobReport, JobError> {
        let started = Instant::now();
        let work = async {
            let retried = self.invalidator.retry_stale().await?;
            let purged = self.store.purge_expired().await?;
            Ok::<_, JobError>((retried, purged))
        };
        let (retried, purged) = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, work)
                .await
                .map_err(|_| JobError::TimedOut(started.elapsed()))??,
            None => work.await?,
        };

        if purged > 0 {
            tracing::debug!(purged, backend = self.store.backend_name(), "expired cache entries purged");
        }

        Ok(JobReport {
            updated: retried,
            failed: 0,
            unchanged: purged,
            timed_out: false,
            elapsed: started.elapsed(),
        })
    }
}
