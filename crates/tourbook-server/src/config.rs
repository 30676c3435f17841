use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, time::Duration};
use tourbook_db_postgres::PostgresConfig;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    /// Redis configuration
    #[serde(default)]
    pub redis: RedisConfig,
    /// Cache behaviour (TTL, timeouts, scan paging)
    #[serde(default)]
    pub cache: CacheConfig,
    /// Record store backend
    #[serde(default)]
    pub storage: StorageConfig,
    /// Background jobs
    #[serde(default)]
    pub jobs: JobsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Prometheus exporter
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), String> {
        // Cache validations
        if self.cache.default_ttl_secs == 0 {
            return Err("cache.default_ttl_secs must be > 0".into());
        }
        if self.cache.operation_timeout_ms == 0 {
            return Err("cache.operation_timeout_ms must be > 0".into());
        }
        if self.cache.scan_count == 0 {
            return Err("cache.scan_count must be > 0".into());
        }
        if self.redis.enabled && self.redis.url.trim().is_empty() {
            return Err("redis.enabled=true requires redis.url".into());
        }
        // Job validations
        let tour = &self.jobs.tour_status;
        if tour.interval_secs == 0 {
            return Err("jobs.tour_status.interval_secs must be > 0".into());
        }
        if tour.concurrency == 0 {
            return Err("jobs.tour_status.concurrency must be > 0".into());
        }
        if tour.max_run_secs == Some(0) {
            return Err("jobs.tour_status.max_run_secs must be > 0 when set".into());
        }
        if self.jobs.cache_retry.interval_secs == 0 {
            return Err("jobs.cache_retry.interval_secs must be > 0".into());
        }
        // Logging validation
        let lvl = self.logging.level.to_ascii_lowercase();
        let valid_levels = ["trace", "debug", "info", "warn", "error", "off"];
        if !valid_levels.contains(&lvl.as_str()) {
            return Err(format!("logging.level must be one of {valid_levels:?}"));
        }
        // Storage validation
        if self.storage.backend == StorageBackend::Postgres {
            match &self.storage.postgres {
                None => {
                    return Err("storage.backend=postgres requires storage.postgres".into());
                }
                Some(pg) if pg.url.trim().is_empty() => {
                    return Err("storage.postgres.url must not be empty".into());
                }
                Some(pg) => pg.quoted_table().map(|_| ()).map_err(|e| e.to_string())?,
            }
        }
        Ok(())
    }
}

/// Redis configuration for sharing the cache across instances
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Enable Redis (gracefully degrades to the local cache without it)
    /// Default: false
    #[serde(default = "default_redis_enabled")]
    pub enabled: bool,

    /// Redis connection URL (e.g., "redis://localhost:6379")
    #[serde(default = "default_redis_url")]
    pub url: String,

    /// Connection pool size
    #[serde(default = "default_redis_pool_size")]
    pub pool_size: usize,

    /// Connection timeout in milliseconds
    #[serde(default = "default_redis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_redis_enabled() -> bool {
    false
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_redis_pool_size() -> usize {
    10
}

fn default_redis_timeout_ms() -> u64 {
    5000
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            enabled: default_redis_enabled(),
            url: default_redis_url(),
            pool_size: default_redis_pool_size(),
            timeout_ms: default_redis_timeout_ms(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Sliding TTL applied on populate and on every hit
    #[serde(default = "default_cache_ttl_secs")]
    pub default_ttl_secs: u64,

    /// Upper bound for a single cache command; slower calls fail open
    #[serde(default = "default_cache_operation_timeout_ms")]
    pub operation_timeout_ms: u64,

    /// `COUNT` hint for each `SCAN` page during invalidation
    #[serde(default = "default_cache_scan_count")]
    pub scan_count: usize,
}

fn default_cache_ttl_secs() -> u64 {
    3600 // 1 hour
}

fn default_cache_operation_timeout_ms() -> u64 {
    250
}

fn default_cache_scan_count() -> usize {
    200
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl_secs: default_cache_ttl_secs(),
            operation_timeout_ms: default_cache_operation_timeout_ms(),
            scan_count: default_cache_scan_count(),
        }
    }
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// PostgreSQL options, required when `backend = "postgres"`
    #[serde(default)]
    pub postgres: Option<PostgresConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct JobsConfig {
    #[serde(default)]
    pub tour_status: TourStatusJobConfig,
    #[serde(default)]
    pub cache_retry: CacheRetryJobConfig,
}

/// Tour lifecycle reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TourStatusJobConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_tour_status_interval_secs")]
    pub interval_secs: u64,

    /// Maximum concurrent record updates within one run
    #[serde(default = "default_tour_status_concurrency")]
    pub concurrency: usize,

    /// Deadline for one run; updates still pending are abandoned and picked
    /// up by the next run
    #[serde(default)]
    pub max_run_secs: Option<u64>,

    #[serde(default = "default_true")]
    pub run_on_startup: bool,
}

fn default_true() -> bool {
    true
}

fn default_tour_status_interval_secs() -> u64 {
    60
}

fn default_tour_status_concurrency() -> usize {
    10
}

impl Default for TourStatusJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_tour_status_interval_secs(),
            concurrency: default_tour_status_concurrency(),
            max_run_secs: None,
            run_on_startup: true,
        }
    }
}

/// Periodic retry of failed invalidations and local cache sweeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRetryJobConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_retry_interval_secs")]
    pub interval_secs: u64,
}

fn default_cache_retry_interval_secs() -> u64 {
    30
}

impl Default for CacheRetryJobConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_cache_retry_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}
fn default_log_level() -> String {
    "info".into()
}
impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9100))
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: default_metrics_listen(),
        }
    }
}

pub mod loader {
    use super::AppConfig;
    use config::{Config, Environment, File};
    use std::path::PathBuf;

    /// Loads the configuration from an optional TOML file plus
    /// `TOURBOOK__SECTION__KEY` environment overrides, then validates it.
    pub fn load_config(path: Option<&str>) -> Result<AppConfig, String> {
        let mut builder = Config::builder();
        let file = PathBuf::from(path.unwrap_or("tourbook.toml"));
        if file.exists() {
            builder = builder.add_source(File::from(file));
        }
        // Environment variable overrides, e.g., TOURBOOK__JOBS__TOUR_STATUS__INTERVAL_SECS=30
        builder = builder.add_source(
            Environment::with_prefix("TOURBOOK")
                .try_parsing(true)
                .separator("__"),
        );
        let cfg = builder
            .build()
            .map_err(|e| format!("config build error: {e}"))?;
        let merged: AppConfig = cfg
            .try_deserialize()
            .map_err(|e| format!("config deserialize error: {e}"))?;
        merged.validate()?;
        Ok(merged)
    }
}
