//! Configuration structures
//!
//! Every section has defaults so a partial file (or an empty one) yields a
//! working local setup. Loading lives in `recordcache-infra::config`.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKEND_CONNECT_TIMEOUT_MS, DEFAULT_BACKEND_OPERATION_TIMEOUT_MS, DEFAULT_BACKEND_URL,
    DEFAULT_CACHE_TTL_SECS, DEFAULT_INDEX_TTL_SECS, DEFAULT_SCAN_BATCH, DEFAULT_SCHEMA_VERSION,
    DEFAULT_STORE_MAX_ATTEMPTS, DEFAULT_STORE_PAGE_SIZE, DEFAULT_STORE_REQUESTS_PER_SECOND,
    DEFAULT_STORE_TIMEOUT_SECS, DEFAULT_SWEEP_CRON, DEFAULT_SWEEP_JOB_TIMEOUT_SECS,
    DEFAULT_TOMBSTONE_TTL_SECS, DEFAULT_TTL_JITTER, KEY_SEPARATOR,
};
use crate::errors::{RecordCacheError, Result};

const GLOB_METACHARACTERS: [char; 5] = ['*', '?', '[', ']', '\\'];
use crate::types::EntityKind;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub cache: CacheConfig,
    pub backend: BackendConfig,
    pub store: StoreConfig,
    pub sweep: SweepConfig,
    pub push: PushConfig,
}

impl Config {
    /// Check cross-field invariants.
    ///
    /// # Errors
    /// Returns `RecordCacheError::Config` describing the first violation.
    pub fn validate(&self) -> Result<()> {
        self.cache.validate()?;

        if self.store.requests_per_second == 0 {
            return Err(RecordCacheError::Config(
                "store.requests_per_second must be greater than 0".into(),
            ));
        }
        if self.store.page_size == 0 || self.store.page_size > 100 {
            return Err(RecordCacheError::Config("store.page_size must be within 1..=100".into()));
        }
        if self.backend.operation_timeout_ms == 0 {
            return Err(RecordCacheError::Config(
                "backend.operation_timeout_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Cache */
/* -------------------------------------------------------------------------- */

/// TTLs and key versioning for cache entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prefix of primary and index keys; bump to mass-invalidate.
    pub schema_version: String,
    pub ttl_secs: u64,
    pub tombstone_ttl_secs: u64,
    pub index_ttl_secs: u64,
    /// Half-width of the jitter band applied to every write.
    pub jitter: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            schema_version: DEFAULT_SCHEMA_VERSION.to_string(),
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            tombstone_ttl_secs: DEFAULT_TOMBSTONE_TTL_SECS,
            index_ttl_secs: DEFAULT_INDEX_TTL_SECS,
            jitter: DEFAULT_TTL_JITTER,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn tombstone_ttl(&self) -> Duration {
        Duration::from_secs(self.tombstone_ttl_secs)
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }

    /// Tombstones must outlive the longest jittered primary entry, even when
    /// the tombstone itself draws the shortest jittered TTL.
    ///
    /// # Errors
    /// Returns `RecordCacheError::Config` on an invalid TTL or version setup.
    pub fn validate(&self) -> Result<()> {
        if self.schema_version.is_empty() || self.schema_version.contains(KEY_SEPARATOR) {
            return Err(RecordCacheError::Config(format!(
                "cache.schema_version must be non-empty and free of '{KEY_SEPARATOR}'"
            )));
        }
        // The version prefixes the SCAN MATCH patterns the sweep enumerates with.
        if self.schema_version.contains(GLOB_METACHARACTERS) {
            return Err(RecordCacheError::Config(format!(
                "cache.schema_version {:?} must not contain glob metacharacters",
                self.schema_version
            )));
        }
        if !(0.0..0.5).contains(&self.jitter) {
            return Err(RecordCacheError::Config(format!(
                "cache.jitter must be within [0, 0.5), got {}",
                self.jitter
            )));
        }
        if self.ttl_secs == 0 || self.index_ttl_secs == 0 {
            return Err(RecordCacheError::Config("cache TTLs must be greater than 0".into()));
        }

        let longest_entry = self.ttl_secs as f64 * (1.0 + self.jitter);
        let shortest_tombstone = self.tombstone_ttl_secs as f64 * (1.0 - self.jitter);
        if shortest_tombstone <= longest_entry {
            return Err(RecordCacheError::Config(format!(
                "cache.tombstone_ttl_secs ({}) must keep tombstones ({shortest_tombstone}s at \
                 minimum jitter) longer than the longest jittered cache TTL ({longest_entry}s)",
                self.tombstone_ttl_secs
            )));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Backend */
/* -------------------------------------------------------------------------- */

/// Connection settings for the key-value backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub connect_timeout_ms: u64,
    pub operation_timeout_ms: u64,
    /// Keys requested per SCAN round trip.
    pub scan_batch: usize,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            connect_timeout_ms: DEFAULT_BACKEND_CONNECT_TIMEOUT_MS,
            operation_timeout_ms: DEFAULT_BACKEND_OPERATION_TIMEOUT_MS,
            scan_batch: DEFAULT_SCAN_BATCH,
        }
    }
}

impl BackendConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

/* -------------------------------------------------------------------------- */
/* Record store */
/* -------------------------------------------------------------------------- */

/// Connection settings for the remote record store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    pub timeout_secs: u64,
    pub max_attempts: usize,
    pub requests_per_second: u32,
    pub page_size: usize,
    /// Remote table name per kind; kinds not listed use their own name.
    pub tables: BTreeMap<EntityKind, String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/v0/base".to_string(),
            api_token: None,
            timeout_secs: DEFAULT_STORE_TIMEOUT_SECS,
            max_attempts: DEFAULT_STORE_MAX_ATTEMPTS,
            requests_per_second: DEFAULT_STORE_REQUESTS_PER_SECOND,
            page_size: DEFAULT_STORE_PAGE_SIZE,
            tables: BTreeMap::new(),
        }
    }
}

impl StoreConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Remote table backing `kind`.
    pub fn table_for(&self, kind: EntityKind) -> &str {
        self.tables.get(&kind).map_or(kind.as_str(), String::as_str)
    }
}

/* -------------------------------------------------------------------------- */
/* Sweep */
/* -------------------------------------------------------------------------- */

/// Schedule for the reconciliation sweep.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    /// Six-field cron expression (seconds first).
    pub cron: String,
    pub job_timeout_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            cron: DEFAULT_SWEEP_CRON.to_string(),
            job_timeout_secs: DEFAULT_SWEEP_JOB_TIMEOUT_SECS,
        }
    }
}

impl SweepConfig {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs)
    }
}

/* -------------------------------------------------------------------------- */
/* Push channel */
/* -------------------------------------------------------------------------- */

/// Push-invalidation channel settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Shared secret expected on every notification; unset disables pushes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shared_secret: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn tombstone_must_outlive_jittered_ttl() {
        let mut config =
            CacheConfig { ttl_secs: 1000, tombstone_ttl_secs: 1080, ..Default::default() };
        assert!(matches!(config.validate(), Err(RecordCacheError::Config(_))));

        config.tombstone_ttl_secs = 1200;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn rejects_schema_version_with_separator() {
        let config = CacheConfig { schema_version: "v1:x".into(), ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_schema_version_with_glob_metacharacters() {
        for version in ["v*", "v?", "v[1]", r"v\1"] {
            let config = CacheConfig { schema_version: version.into(), ..Default::default() };
            assert!(
                matches!(config.validate(), Err(RecordCacheError::Config(_))),
                "{version} accepted"
            );
        }
        let config = CacheConfig { schema_version: "v2-beta.1".into(), ..Default::default() };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn tombstone_check_does_not_overflow_on_huge_ttls() {
        let config =
            CacheConfig { ttl_secs: u64::MAX, tombstone_ttl_secs: u64::MAX, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_jitter() {
        let config = CacheConfig { jitter: 0.5, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_rate_limit() {
        let mut config = Config::default();
        config.store.requests_per_second = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn table_names_fall_back_to_kind() {
        let mut store = StoreConfig::default();
        store.tables.insert(EntityKind::Users, "Hackers".into());
        assert_eq!(store.table_for(EntityKind::Users), "Hackers");
        assert_eq!(store.table_for(EntityKind::Votes), "votes");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: Config =
            serde_json::from_str(r#"{ "cache": { "ttl_secs": 60, "tombstone_ttl_secs": 600 } }"#)
                .unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.cache.schema_version, "v1");
        assert_eq!(config.sweep.cron, DEFAULT_SWEEP_CRON);
    }
}
