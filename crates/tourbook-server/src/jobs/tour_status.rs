//! Tour lifecycle reconciliation.
//!
//! Tours move through UPCOMING → ONGOING → COMPLETED as time passes, but
//! nothing writes those transitions when they happen. This job periodically
//! scans the active tours, recomputes each status from the clock and the
//! tour's date window, and writes only the records that drifted.
//!
//! Any run that may have written, including one cut short by its deadline or
//! one whose writes reported errors, ends by invalidating the tour cache
//! family.

use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Instant;
use tourbook_storage::{
    DynRecordStore, LifecycleRecord, RecordFilter, RecordId, RecordPatch, StorageError, TourStatus,
};
use tracing::{debug, error, info, warn};

use super::{JobError, JobReport, ScheduledJob};
use crate::cache::{Invalidator, ResourceKind};
use crate::clock::DynClock;

/// Default number of concurrent record updates.
pub const DEFAULT_CONCURRENCY: usize = 10;

/// The status a tour should have at `now`.
///
/// CANCELLED never changes. Combinations the transition rules do not cover
/// keep their current status.
pub fn desired_status(
    current: TourStatus,
    now: OffsetDateTime,
    start: OffsetDateTime,
    end: OffsetDateTime,
) -> TourStatus {
    match current {
        TourStatus::Cancelled => TourStatus::Cancelled,
        TourStatus::Upcoming | TourStatus::Ongoing if now >= end => TourStatus::Completed,
        TourStatus::Upcoming | TourStatus::Ongoing if start <= now => TourStatus::Ongoing,
        TourStatus::Ongoing | TourStatus::Completed if now < start => TourStatus::Upcoming,
        other => other,
    }
}

/// Recomputes tour statuses and writes the corrections.
pub struct TourStatusReconciler {
    store: DynRecordStore,
    clock: DynClock,
    invalidator: Option<Invalidator>,
    concurrency: usize,
}

type UpdateOutcome = (RecordId, TourStatus, TourStatus, Result<LifecycleRecord, StorageError>);

impl TourStatusReconciler {
    pub fn new(store: DynRecordStore, clock: DynClock) -> Self {
        Self {
            store,
            clock,
            invalidator: None,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Invalidate the tour cache family after a run that changed anything.
    pub fn with_invalidator(mut self, invalidator: Invalidator) -> Self {
        self.invalidator = Some(invalidator);
        self
    }

    /// Maximum number of updates in flight at once.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Runs one reconciliation pass with no deadline.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Fetch` when the candidate scan fails. Individual
    /// update failures are counted in the report instead.
    pub async fn run_once(&self) -> Result<JobReport, JobError> {
        self.run_until(None).await
    }

    /// Runs one reconciliation pass, abandoning updates still pending at
    /// `deadline`.
    ///
    /// Abandoned updates count as failed and are picked up by the next run.
    /// The tour cache is invalidated after the pass whenever a write may
    /// have landed, even past the deadline.
    ///
    /// # Errors
    ///
    /// Returns `JobError::Fetch` when the candidate scan fails and
    /// `JobError::TimedOut` when the deadline passes before any update was
    /// started.
    pub async fn run_until(&self, deadline: Option<Instant>) -> Result<JobReport, JobError> {
        let started = Instant::now();
        let now = self.clock.now();

        // Only active tours are scanned; COMPLETED rows reset externally are
        // not revisited.
        let filter = RecordFilter::status_in([TourStatus::Upcoming, TourStatus::Ongoing]);
        let fetch = self.store.find_many(&filter);
        let candidates = match deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fetch)
                .await
                .map_err(|_| JobError::TimedOut(started.elapsed()))?,
            None => fetch.await,
        }
        .map_err(JobError::Fetch)?;

        let mut report = JobReport::default();
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<UpdateOutcome> = JoinSet::new();

        for record in candidates {
            let desired = desired_status(record.status, now, record.start_time, record.end_time);
            if desired == record.status {
                report.unchanged += 1;
                continue;
            }

            let store = Arc::clone(&self.store);
            let semaphore = Arc::clone(&semaphore);
            let (id, from) = (record.id, record.status);
            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        let err = StorageError::internal("update limiter closed");
                        return (id, from, desired, Err(err));
                    }
                };
                let result = store.update(id, &RecordPatch::status(desired)).await;
                (id, from, desired, result)
            });
        }

        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        report.timed_out = true;
                        tasks.abort_all();
                        break;
                    }
                },
                None => tasks.join_next().await,
            };
            let Some(joined) = joined else { break };
            tally(&mut report, joined);
        }
        // Abort is not instant: tasks that finished first still report
        // their real outcome.
        while let Some(joined) = tasks.join_next().await {
            tally(&mut report, joined);
        }

        // A failed or abandoned update may still have committed.
        if report.updated > 0 || report.failed > 0 {
            self.invalidate_tours().await;
        }

        report.elapsed = started.elapsed();
        if report.timed_out {
            warn!(
                updated = report.updated,
                failed = report.failed,
                unchanged = report.unchanged,
                "tour status reconciliation stopped at its deadline"
            );
        } else {
            info!(
                updated = report.updated,
                failed = report.failed,
                unchanged = report.unchanged,
                "tour status reconciliation finished"
            );
        }
        Ok(report)
    }

    async fn invalidate_tours(&self) {
        let Some(invalidator) = &self.invalidator else {
            return;
        };
        let patterns = ResourceKind::Tours.invalidation_patterns();
        match invalidator.invalidate_all(&patterns).await {
            Ok(removed) => debug!(removed, "tour cache invalidated after reconciliation"),
            Err(e) => warn!(error = %e, "tour cache invalidation after reconciliation failed"),
        }
    }
}

#[async_trait]
impl ScheduledJob for TourStatusReconciler {
    fn name(&self) -> &'static str {
        "tour_status"
    }

    async fn run(&self, deadline: Option<Instant>) -> Result<JobReport, JobError> {
        self.run_until(deadline).await
    }
}

fn tally(report: &mut JobReport, joined: Result<UpdateOutcome, JoinError>) {
    match joined {
        Ok((id, from, to, Ok(_))) => {
            report.updated += 1;
            debug!(tour_id = id, %from, %to, "tour status updated");
        }
        Ok((id, from, to, Err(e))) => {
            report.failed += 1;
            warn!(tour_id = id, %from, %to, error = %e, "tour status update failed");
        }
        Err(e) if e.is_cancelled() => {
            report.failed += 1;
            debug!("tour status update abandoned at deadline");
        }
        Err(e) => {
            report.failed += 1;
            error!(error = %e, "tour status update task aborted");
        }
    }
}
