//! Logging setup.
//!
//! The subscriber is installed once at startup with a reloadable level
//! filter, so the level from the loaded configuration can be applied after
//! the config file has been read. An explicit `RUST_LOG` always takes
//! precedence over the configured level.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

/// Level used before configuration is loaded.
pub const DEFAULT_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

static FILTER_HANDLE: OnceLock<FilterHandle> = OnceLock::new();

/// Installs the global subscriber at [`DEFAULT_LEVEL`] (or `RUST_LOG`).
///
/// Calling it again is a no-op.
pub fn init_tracing() {
    let initial = rust_log_filter().unwrap_or_else(|| level_filter(DEFAULT_LEVEL));
    let (filter, handle) = reload::Layer::new(initial);
    if FILTER_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .try_init();
}

/// Switches to the configured `level` unless `RUST_LOG` is set.
///
/// Returns whether the filter was replaced.
pub fn apply_logging_level(level: &str) -> bool {
    if std::env::var_os("RUST_LOG").is_some() {
        return false;
    }
    let Some(handle) = FILTER_HANDLE.get() else {
        return false;
    };
    handle.modify(|f| *f = level_filter(level)).is_ok()
}

fn rust_log_filter() -> Option<EnvFilter> {
    std::env::var_os("RUST_LOG")?;
    EnvFilter::try_from_default_env().ok()
}

/// Parses a filter directive such as `info` or `tourbook_server=debug`.
/// Unparseable directives fall back to [`DEFAULT_LEVEL`].
fn level_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("invalid log level {level:?} ({e}), using {DEFAULT_LEVEL}");
        EnvFilter::new(DEFAULT_LEVEL)
    })
}
