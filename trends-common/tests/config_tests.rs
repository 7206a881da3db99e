//! Integration tests for configuration loading
//!
//! Covers file parsing, serde defaults for partial files, environment
//! overrides and validation failures.
//!
//! Note: Uses serial_test crate to prevent ENV variable race conditions.
//! Tests that manipulate TRENDS_* variables are marked with #[serial].

use serial_test::serial;
use std::env;
use std::path::PathBuf;
use tempfile::TempDir;
use trends_common::config::HarvesterConfig;
use trends_common::Error;

const ENV_VARS: &[&str] = &[
    "TRENDS_HOST",
    "TRENDS_PORT",
    "TRENDS_LOG_LEVEL",
    "TRENDS_CACHE_TTL",
    "TRENDS_MAX_WORKERS",
    "TRENDS_DOWNLOAD_TIMEOUT",
    "TRENDS_DOWNLOAD_DIR",
    "TRENDS_AGENT_PROGRAM",
    "TRENDS_CORS_ORIGINS",
];

fn clear_env() {
    for var in ENV_VARS {
        env::remove_var(var);
    }
}

fn write_config(dir: &TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    std::fs::write(&path, content).unwrap();
    path
}

#[test]
#[serial]
fn test_partial_file_keeps_defaults_for_missing_fields() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
port = 9100

[cache]
ttl_secs = 120
"#,
    );

    let config = HarvesterConfig::load(Some(&path)).unwrap();

    assert_eq!(config.port, 9100);
    assert_eq!(config.cache.ttl_secs, 120);
    assert_eq!(config.host, "0.0.0.0");
    assert_eq!(config.workers.max, 5);
    assert_eq!(config.retrieval.download_dir, PathBuf::from("temp_downloads"));
    assert_eq!(config.geographies, vec!["IN", "US", "GB"]);
}

#[test]
#[serial]
fn test_env_overrides_file_values() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[cache]
ttl_secs = 120

[retrieval]
artifact_timeout_secs = 10
"#,
    );

    env::set_var("TRENDS_CACHE_TTL", "60");
    env::set_var("TRENDS_DOWNLOAD_TIMEOUT", "25");
    env::set_var("TRENDS_CORS_ORIGINS", "https://a.example, https://b.example");

    let config = HarvesterConfig::load(Some(&path)).unwrap();
    clear_env();

    assert_eq!(config.cache.ttl_secs, 60);
    assert_eq!(config.retrieval.artifact_timeout_secs, 25);
    assert_eq!(
        config.cors_origins,
        vec!["https://a.example".to_string(), "https://b.example".to_string()]
    );
}

#[test]
#[serial]
fn test_max_workers_override_pulls_default_into_range() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    env::set_var("TRENDS_MAX_WORKERS", "2");
    let config = HarvesterConfig::load(Some(&path)).unwrap();
    clear_env();

    let bounds = config.worker_bounds().unwrap();
    assert_eq!(bounds.max(), 2);
    assert_eq!(bounds.default_workers(), 2);
    assert_eq!(bounds.clamp(Some(5)), 2);
}

#[test]
#[serial]
fn test_unparseable_env_value_is_config_error() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "");

    env::set_var("TRENDS_PORT", "not-a-port");
    let result = HarvesterConfig::load(Some(&path));
    clear_env();

    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_invalid_worker_range_rejected_at_load() {
    clear_env();
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[workers]
min = 3
max = 2
default = 2
"#,
    );

    assert!(matches!(HarvesterConfig::load(Some(&path)), Err(Error::Config(_))));
}

#[test]
#[serial]
fn test_explicit_missing_file_is_error() {
    clear_env();
    let result = HarvesterConfig::load(Some(std::path::Path::new("/nonexistent/trends.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_malformed_toml_is_error() {
    let result = HarvesterConfig::from_toml_str("port = \"eighty\"");
    assert!(matches!(result, Err(Error::Config(_))));
}
