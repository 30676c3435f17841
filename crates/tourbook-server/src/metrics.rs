//! Prometheus metrics for the tourbook server.
//!
//! This module provides:
//! - Cache metrics (hits, misses, fail-open errors, bypasses)
//! - Invalidation metrics (keys removed, failures)
//! - Background job metrics (records updated/failed/unchanged, run duration)

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;

static INSTALLED: AtomicBool = AtomicBool::new(false);

/// Metric names as constants for consistency.
pub mod names {
    // Cache metrics
    pub const CACHE_HITS_TOTAL: &str = "cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "cache_misses_total";
    pub const CACHE_ERRORS_TOTAL: &str = "cache_errors_total";
    pub const CACHE_BYPASS_TOTAL: &str = "cache_bypass_total";

    // Invalidation metrics
    pub const CACHE_INVALIDATED_KEYS_TOTAL: &str = "cache_invalidated_keys_total";
    pub const CACHE_INVALIDATION_FAILURES_TOTAL: &str = "cache_invalidation_failures_total";

    // Job metrics
    pub const JOB_RUNS_TOTAL: &str = "job_runs_total";
    pub const JOB_RUN_DURATION_SECONDS: &str = "job_run_duration_seconds";
    pub const JOB_RECORDS_TOTAL: &str = "job_records_total";
}

/// Install the Prometheus exporter with an HTTP listener on `listen`.
///
/// Must be called from within a Tokio runtime.
/// Returns `true` if installation succeeded, `false` if already installed or failed.
pub fn init_metrics(listen: SocketAddr) -> bool {
    if INSTALLED.swap(true, Ordering::SeqCst) {
        tracing::debug!("Prometheus exporter already installed");
        return false;
    }

    match PrometheusBuilder::new().with_http_listener(listen).install() {
        Ok(()) => {
            tracing::info!(%listen, "Prometheus exporter listening");
            true
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to install Prometheus exporter");
            false
        }
    }
}

// =============================================================================
// Cache Metrics
// =============================================================================

/// Record a cache hit.
pub fn record_cache_hit(backend: &'static str) {
    counter!(names::CACHE_HITS_TOTAL, "backend" => backend).increment(1);
}

/// Record a cache miss.
pub fn record_cache_miss(backend: &'static str) {
    counter!(names::CACHE_MISSES_TOTAL, "backend" => backend).increment(1);
}

/// Record a cache transport error that was absorbed (fail-open).
pub fn record_cache_error(operation: &'static str) {
    counter!(names::CACHE_ERRORS_TOTAL, "operation" => operation).increment(1);
}

/// Record a read that skipped the cache because its key may be stale.
pub fn record_cache_bypass() {
    counter!(names::CACHE_BYPASS_TOTAL).increment(1);
}

// =============================================================================
// Invalidation Metrics
// =============================================================================

/// Record keys removed by one invalidation.
pub fn record_invalidation(removed: u64) {
    counter!(names::CACHE_INVALIDATED_KEYS_TOTAL).increment(removed);
}

/// Record a failed invalidation.
pub fn record_invalidation_failure() {
    counter!(names::CACHE_INVALIDATION_FAILURES_TOTAL).increment(1);
}

// =============================================================================
// Job Metrics
// =============================================================================

/// Record the outcome of one job run.
pub fn record_job_run(job: &'static str, outcome: &'static str, duration: Duration) {
    counter!(names::JOB_RUNS_TOTAL, "job" => job, "outcome" => outcome).increment(1);
    histogram!(names::JOB_RUN_DURATION_SECONDS, "job" => job).record(duration.as_secs_f64());
}

/// Record per-record results of a job run.
pub fn record_job_records(job: &'static str, updated: u64, failed: u64, unchanged: u64) {
    counter!(names::JOB_RECORDS_TOTAL, "job" => job, "result" => "updated").increment(updated);
    counter!(names::JOB_RECORDS_TOTAL, "job" => job, "result" => "failed").increment(failed);
    counter!(names::JOB_RECORDS_TOTAL, "job" => job, "result" => "unchanged").increment(unchanged);
}
