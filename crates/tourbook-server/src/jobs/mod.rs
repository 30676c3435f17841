//! Background jobs.
//!
//! Jobs implement [`ScheduledJob`] and are driven by a [`JobScheduler`] on a
//! fixed interval. A run either produces a [`JobReport`] or fails as a whole
//! with a [`JobError`]; per-record failures never fail a run.
//!
//! A time box is handed to the job as a deadline rather than enforced by
//! dropping the run, so a job that writes can stop at the deadline and still
//! finish its cleanup.

pub mod cache_retry;
pub mod scheduler;
pub mod tour_status;

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tourbook_storage::StorageError;

use crate::cache::CacheError;

pub use cache_retry::CacheMaintenanceJob;
pub use scheduler::{JobCallback, JobScheduler, JobSchedulerConfig};
pub use tour_status::{TourStatusReconciler, desired_status};

/// Summary of one job run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Records written.
    pub updated: u64,
    /// Records whose write failed; retried on the next run.
    pub failed: u64,
    /// Records already in the right state.
    pub unchanged: u64,
    /// The run stopped at its deadline with work left over.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl JobReport {
    /// Compares counts only, ignoring timing.
    pub fn counts(&self) -> (u64, u64, u64) {
        (self.updated, self.failed, self.unchanged)
    }
}

/// Errors that abort a whole run.
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    /// Candidates could not be fetched from the record store.
    #[error("failed to fetch candidates: {0}")]
    Fetch(#[source] StorageError),

    /// A cache maintenance step failed.
    #[error("cache maintenance failed: {0}")]
    Cache(#[from] CacheError),

    /// The run exceeded its time box.
    #[error("run timed out after {0:?}")]
    TimedOut(Duration),
}

/// A unit of periodic work.
#[async_trait]
pub trait ScheduledJob: Send + Sync {
    /// Stable name used in logs and metrics.
    fn name(&self) -> &'static str;

    /// Runs once. Work still pending at `deadline` must be abandoned, but
    /// anything needed to keep already-written state consistent still runs.
    async fn run(&self, deadline: Option<Instant>) -> Result<JobReport, JobError>;
}
