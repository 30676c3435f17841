//! Fixed-interval scheduler for background jobs.
//!
//! Each scheduler owns one job and runs it in a spawned task until the
//! shutdown channel flips to `true`. Runs never overlap: a tick that fires
//! while a run is still in progress is skipped.
//!
//! `max_run_secs` becomes a deadline passed to the job. The scheduler never
//! drops a run in progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use super::{JobError, JobReport, ScheduledJob};
use crate::metrics;

/// Called after every run with its outcome.
pub type JobCallback = Arc<dyn Fn(&str, &Result<JobReport, JobError>) + Send + Sync>;

/// Configuration for a job scheduler.
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Time between runs (in seconds).
    /// Default: 60 seconds
    pub interval_secs: u64,

    /// Whether to run immediately on start instead of after one interval.
    /// Default: true
    pub run_on_startup: bool,

    /// Deadline handed to each run (in seconds after it starts).
    /// Default: none
    pub max_run_secs: Option<u64>,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            run_on_startup: true,
            max_run_secs: None,
        }
    }
}

/// Runs a [`ScheduledJob`] on a fixed interval.
pub struct JobScheduler {
    job: Arc<dyn ScheduledJob>,
    config: JobSchedulerConfig,
    on_complete: Option<JobCallback>,
}

impl JobScheduler {
    pub fn new(job: Arc<dyn ScheduledJob>, config: JobSchedulerConfig) -> Self {
        Self {
            job,
            config,
            on_complete: None,
        }
    }

    /// Registers a callback invoked with each run's outcome.
    pub fn on_complete(mut self, callback: JobCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    /// Runs the job once with its deadline, metrics and logging.
    pub async fn run_once(&self) -> Result<JobReport, JobError> {
        let name = self.job.name();
        let started = Instant::now();
        let deadline = self
            .config
            .max_run_secs
            .map(|secs| started + Duration::from_secs(secs));

        let result = self.job.run(deadline).await;

        let elapsed = started.elapsed();
        match &result {
            Ok(report) => {
                let outcome = if report.timed_out { "timed_out" } else { "success" };
                metrics::record_job_run(name, outcome, elapsed);
                metrics::record_job_records(name, report.updated, report.failed, report.unchanged);
                if report.timed_out {
                    warn!(
                        job = name,
                        updated = report.updated,
                        failed = report.failed,
                        unchanged = report.unchanged,
                        "Job run stopped at its deadline"
                    );
                } else if report.failed > 0 {
                    warn!(
                        job = name,
                        updated = report.updated,
                        failed = report.failed,
                        unchanged = report.unchanged,
                        "Job run completed with failures"
                    );
                } else {
                    debug!(
                        job = name,
                        updated = report.updated,
                        unchanged = report.unchanged,
                        elapsed_ms = elapsed.as_millis() as u64,
                        "Job run completed"
                    );
                }
            }
            Err(e) => {
                metrics::record_job_run(name, "error", elapsed);
                error!(job = name, error = %e, "Job run failed");
            }
        }

        if let Some(callback) = &self.on_complete {
            callback(name, &result);
        }
        result
    }

    /// Start the scheduler in a background task.
    ///
    /// Returns a shutdown sender that stops the scheduler and the handle of
    /// the spawned task.
    pub fn start(self) -> (watch::Sender<bool>, JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let period = Duration::from_secs(self.config.interval_secs.max(1));
            info!(
                job = self.job.name(),
                interval_secs = period.as_secs(),
                "Job scheduler started"
            );

            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            if !self.config.run_on_startup {
                // The first tick of a tokio interval completes immediately.
                ticker.tick().await;
            }

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let _ = self.run_once().await;
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            info!(job = self.job.name(), "Job scheduler shutting down");
                            break;
                        }
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }
}
