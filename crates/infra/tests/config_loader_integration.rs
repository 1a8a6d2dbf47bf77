//! Integration tests for configuration loader
//!
//! Tests the end-to-end behavior of loading configuration from files.

use std::io::Write;
use std::path::PathBuf;

use recordcache_domain::{EntityKind, RecordCacheError};
use recordcache_infra::config;
use recordcache_infra::scheduling::SweepSchedulerConfig;
use tempfile::NamedTempFile;

fn write_config(contents: &str, extension: &str) -> PathBuf {
    let mut temp_file = NamedTempFile::new().expect("Failed to create temp file");
    temp_file.write_all(contents.as_bytes()).expect("Failed to write to temp file");

    let path = temp_file.path().with_extension(extension);
    std::fs::copy(temp_file.path(), &path).expect("Failed to copy file");
    path
}

#[test]
fn test_load_full_config_from_toml_file() {
    let path = write_config(
        r#"
[cache]
schema_version = "v3"
ttl_secs = 600
tombstone_ttl_secs = 3600
index_ttl_secs = 900
jitter = 0.1

[backend]
url = "redis://cache.internal:6379/2"
operation_timeout_ms = 250

[store]
base_url = "https://store.example.com/v0/appXYZ"
requests_per_second = 4
page_size = 50

[store.tables]
users = "Hackers"
referrals = "Invites"

[sweep]
cron = "0 15 4 * * *"
job_timeout_secs = 900

[push]
shared_secret = "from-file"
"#,
        "toml",
    );

    let config = config::load_from_file(Some(path.clone())).expect("config loads");
    assert!(config.validate().is_ok());

    assert_eq!(config.cache.schema_version, "v3");
    assert_eq!(config.cache.ttl_secs, 600);
    assert!((config.cache.jitter - 0.1).abs() < f64::EPSILON);
    assert_eq!(config.backend.url, "redis://cache.internal:6379/2");
    assert_eq!(config.backend.operation_timeout_ms, 250);
    assert_eq!(config.store.page_size, 50);
    assert_eq!(config.store.table_for(EntityKind::Users), "Hackers");
    assert_eq!(config.store.table_for(EntityKind::Referrals), "Invites");
    assert_eq!(config.store.table_for(EntityKind::Events), "events");
    assert_eq!(config.push.shared_secret.as_deref(), Some("from-file"));

    let scheduler = SweepSchedulerConfig::from(&config.sweep);
    assert_eq!(scheduler.cron_expression, "0 15 4 * * *");
    assert_eq!(scheduler.job_timeout.as_secs(), 900);

    std::fs::remove_file(path).ok();
}

#[test]
fn test_empty_json_file_yields_valid_defaults() {
    let path = write_config("{}", "json");

    let config = config::load_from_file(Some(path.clone())).expect("config loads");
    assert!(config.validate().is_ok());
    assert_eq!(config.cache.schema_version, "v1");
    assert!(config.push.shared_secret.is_none());

    std::fs::remove_file(path).ok();
}

#[test]
fn test_tombstone_shorter_than_cache_ttl_fails_validation() {
    let path = write_config(
        r#"{ "cache": { "ttl_secs": 3600, "tombstone_ttl_secs": 3600 } }"#,
        "json",
    );

    let config = config::load_from_file(Some(path.clone())).expect("parses");
    assert!(matches!(config.validate(), Err(RecordCacheError::Config(_))));

    std::fs::remove_file(path).ok();
}

#[test]
fn test_unknown_entity_table_is_rejected() {
    let path = write_config(
        r#"{ "store": { "tables": { "comments": "Comments" } } }"#,
        "json",
    );

    let result = config::load_from_file(Some(path.clone()));
    assert!(matches!(result, Err(RecordCacheError::Config(_))));

    std::fs::remove_file(path).ok();
}

#[test]
fn test_wrong_value_type_is_rejected() {
    let path = write_config("[sweep]\nenabled = \"sometimes\"\n", "toml");

    let result = config::load_from_file(Some(path.clone()));
    assert!(matches!(result, Err(RecordCacheError::Config(msg)) if msg.contains("TOML")));

    std::fs::remove_file(path).ok();
}
