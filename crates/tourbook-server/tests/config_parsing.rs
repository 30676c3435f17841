use std::{env, fs};

use tourbook_server::config::{StorageBackend, loader::load_config};

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("tourbook.toml");

    let toml_content = r#"
[redis]
enabled = false
url = "redis://cache:6379"

[cache]
default_ttl_secs = 1800
operation_timeout_ms = 100

[storage]
backend = "postgres"

[storage.postgres]
url = "postgres://tourbook:tourbook@db/tourbook"
table = "public.tours"

[jobs.tour_status]
interval_secs = 30
concurrency = 4
max_run_secs = 20

[logging]
level = "debug"

[metrics]
enabled = true
listen = "127.0.0.1:9200"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) Valid config parses
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.cache.default_ttl_secs, 1800);
    assert_eq!(cfg.cache.scan_count, 200);
    assert_eq!(cfg.storage.backend, StorageBackend::Postgres);
    assert_eq!(cfg.storage.postgres.as_ref().map(|p| p.table.as_str()), Some("public.tours"));
    assert_eq!(cfg.jobs.tour_status.concurrency, 4);
    assert_eq!(cfg.jobs.tour_status.max_run_secs, Some(20));
    assert_eq!(cfg.jobs.cache_retry.interval_secs, 30);
    assert_eq!(cfg.metrics.listen.port(), 9200);

    // 2) Env override should win over file
    unsafe {
        env::set_var("TOURBOOK__JOBS__TOUR_STATUS__CONCURRENCY", "16");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.jobs.tour_status.concurrency, 16);
    unsafe {
        env::remove_var("TOURBOOK__JOBS__TOUR_STATUS__CONCURRENCY");
    }

    // 3) Invalid values are rejected
    let invalid = toml_content.replace("interval_secs = 30", "interval_secs = 0");
    fs::write(&path, invalid).expect("write toml");
    let err = load_config(path.to_str()).expect_err("zero interval must be rejected");
    assert!(err.contains("interval_secs"));
}

#[test]
fn missing_file_uses_defaults() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("absent.toml");

    let cfg = load_config(path.to_str()).expect("defaults are valid");
    assert_eq!(cfg.storage.backend, StorageBackend::Memory);
    assert_eq!(cfg.cache.default_ttl_secs, 3600);
    assert!(cfg.jobs.tour_status.enabled);
}
