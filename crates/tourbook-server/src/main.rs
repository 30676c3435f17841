use std::{env, sync::Arc};

use anyhow::Context;
use tourbook_server::cache::{Invalidator, StalePatterns, create_cache_backend};
use tourbook_server::clock::{DynClock, SystemClock};
use tourbook_server::config::{AppConfig, loader::load_config};
use tourbook_server::jobs::{
    CacheMaintenanceJob, JobScheduler, JobSchedulerConfig, TourStatusReconciler,
};
use tourbook_server::{create_record_store, metrics, observability};

/// How the configuration path was determined.
#[derive(Debug, Clone, Copy)]
enum ConfigSource {
    /// From --config CLI argument
    CliArgument,
    /// From TOURBOOK_CONFIG environment variable
    EnvironmentVariable,
    /// Default path (tourbook.toml)
    Default,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CliArgument => write!(f, "CLI argument (--config)"),
            Self::EnvironmentVariable => write!(f, "environment variable (TOURBOOK_CONFIG)"),
            Self::Default => write!(f, "default"),
        }
    }
}

#[tokio::main]
async fn main() {
    // Load .env file if present (before anything else)
    if let Err(e) = dotenvy::dotenv() {
        // Not an error if .env doesn't exist - it's optional
        if !matches!(e, dotenvy::Error::Io(ref io_err) if io_err.kind() == std::io::ErrorKind::NotFound) {
            eprintln!("Warning: Failed to load .env file: {e}");
        }
    }

    // Initialize tracing early with the default level
    observability::init_tracing();

    let (config_path, source) = resolve_config_path();

    let cfg = match load_config(Some(&config_path)) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            std::process::exit(2);
        }
    };

    tracing::info!(
        path = %config_path,
        source = %source,
        "Configuration loaded"
    );

    if !observability::apply_logging_level(&cfg.logging.level) {
        tracing::debug!(level = %cfg.logging.level, "RUST_LOG set, configured level ignored");
    }

    if let Err(e) = run(cfg).await {
        eprintln!("Server error: {e:#}");
        std::process::exit(1);
    }
}

async fn run(cfg: AppConfig) -> anyhow::Result<()> {
    if cfg.metrics.enabled {
        metrics::init_metrics(cfg.metrics.listen);
    }

    let clock: DynClock = Arc::new(SystemClock);
    let cache = create_cache_backend(&cfg.redis, &cfg.cache, clock.clone()).await;
    let invalidator = Invalidator::new(cache.clone(), StalePatterns::new());

    let records = create_record_store(&cfg.storage)
        .await
        .context("record store initialization failed")?;
    tracing::info!(
        cache = cache.backend_name(),
        records = records.backend_name(),
        "Backends ready"
    );

    let mut schedulers = Vec::new();

    let tour_cfg = &cfg.jobs.tour_status;
    if tour_cfg.enabled {
        let reconciler = TourStatusReconciler::new(records.clone(), clock.clone())
            .with_invalidator(invalidator.clone())
            .with_concurrency(tour_cfg.concurrency);
        let scheduler = JobScheduler::new(
            Arc::new(reconciler),
            JobSchedulerConfig {
                interval_secs: tour_cfg.interval_secs,
                run_on_startup: tour_cfg.run_on_startup,
                max_run_secs: tour_cfg.max_run_secs,
            },
        );
        schedulers.push(scheduler.start());
    } else {
        tracing::info!("Tour status reconciliation disabled");
    }

    let retry_cfg = &cfg.jobs.cache_retry;
    if retry_cfg.enabled {
        let job = CacheMaintenanceJob::new(invalidator.clone(), cache.clone());
        let scheduler = JobScheduler::new(
            Arc::new(job),
            JobSchedulerConfig {
                interval_secs: retry_cfg.interval_secs,
                run_on_startup: false,
                max_run_secs: None,
            },
        );
        schedulers.push(scheduler.start());
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    for (shutdown, _) in &schedulers {
        let _ = shutdown.send(true);
    }
    for (_, handle) in schedulers {
        if let Err(e) = handle.await {
            tracing::warn!(error = %e, "Job scheduler task ended abnormally");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Resolve the configuration file path.
///
/// Priority order:
/// 1. CLI argument: --config <path>
/// 2. Environment variable: TOURBOOK_CONFIG
/// 3. Default: tourbook.toml
fn resolve_config_path() -> (String, ConfigSource) {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            if let Some(path) = args.next() {
                return (path, ConfigSource::CliArgument);
            }
        }
    }

    if let Ok(path) = env::var("TOURBOOK_CONFIG") {
        if !path.is_empty() {
            return (path, ConfigSource::EnvironmentVariable);
        }
    }

    ("tourbook.toml".to_string(), ConfigSource::Default)
}
