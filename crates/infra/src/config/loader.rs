//! Configuration loader
//!
//! ## Loading Strategy
//! 1. Attempt to load from environment variables
//! 2. If the required variables are missing, fall back to a config file
//! 3. Probe multiple paths for config files (JSON or TOML)
//! 4. Apply secret overrides from the environment on top of file values
//!
//! ## Environment Variables
//! Required for environment-only loading:
//! - `RECORDCACHE_BACKEND_URL`: key-value backend URL (`redis://...`)
//! - `RECORDCACHE_STORE_BASE_URL`: record store base URL
//!
//! Optional:
//! - `RECORDCACHE_STORE_API_TOKEN`: bearer token for the record store
//! - `RECORDCACHE_STORE_REQUESTS_PER_SECOND`: client-side rate limit
//! - `RECORDCACHE_PUSH_SHARED_SECRET`: secret expected on push notifications
//! - `RECORDCACHE_SCHEMA_VERSION`: cache key version prefix
//! - `RECORDCACHE_CACHE_TTL_SECS`, `RECORDCACHE_TOMBSTONE_TTL_SECS`,
//!   `RECORDCACHE_INDEX_TTL_SECS`: TTLs in seconds
//! - `RECORDCACHE_SWEEP_CRON`: six-field cron expression
//! - `RECORDCACHE_SWEEP_ENABLED`: whether the nightly sweep runs
//!
//! The token and push secret are applied on top of file configuration too,
//! so they never have to live on disk.
//!
//! ## File Locations
//! `recordcache.{toml,json}` then `config.{toml,json}`, in the working
//! directory, its two parents, then next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use recordcache_domain::{Config, RecordCacheError, Result};

const CONFIG_FILE_NAMES: [&str; 4] =
    ["recordcache.toml", "recordcache.json", "config.toml", "config.json"];

/// Load configuration, environment first, then file.
///
/// The result is validated before it is returned.
///
/// # Errors
/// Returns `RecordCacheError::Config` when neither source yields a valid
/// configuration.
pub fn load() -> Result<Config> {
    let config = match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            config
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            let mut config = load_from_file(None)?;
            apply_secret_overrides(&mut config);
            config
        }
    };

    config.validate()?;
    Ok(config)
}

/// Load configuration from environment variables.
///
/// Unset optional variables keep their defaults.
///
/// # Errors
/// Returns `RecordCacheError::Config` if a required variable is missing or
/// any variable has an invalid value.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.backend.url = env_var("RECORDCACHE_BACKEND_URL")?;
    config.store.base_url = env_var("RECORDCACHE_STORE_BASE_URL")?;

    if let Some(rps) = env_parse::<u32>("RECORDCACHE_STORE_REQUESTS_PER_SECOND")? {
        config.store.requests_per_second = rps;
    }
    if let Some(version) = env_opt("RECORDCACHE_SCHEMA_VERSION") {
        config.cache.schema_version = version;
    }
    if let Some(ttl) = env_parse::<u64>("RECORDCACHE_CACHE_TTL_SECS")? {
        config.cache.ttl_secs = ttl;
    }
    if let Some(ttl) = env_parse::<u64>("RECORDCACHE_TOMBSTONE_TTL_SECS")? {
        config.cache.tombstone_ttl_secs = ttl;
    }
    if let Some(ttl) = env_parse::<u64>("RECORDCACHE_INDEX_TTL_SECS")? {
        config.cache.index_ttl_secs = ttl;
    }
    if let Some(cron) = env_opt("RECORDCACHE_SWEEP_CRON") {
        config.sweep.cron = cron;
    }
    config.sweep.enabled = env_bool("RECORDCACHE_SWEEP_ENABLED", config.sweep.enabled);

    apply_secret_overrides(&mut config);
    Ok(config)
}

/// Load configuration from a file.
///
/// If `path` is `None`, probes the standard locations via
/// [`probe_config_paths`]. The format is picked by extension.
///
/// # Errors
/// Returns `RecordCacheError::Config` if the file is missing, unreadable,
/// or malformed.
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(RecordCacheError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            RecordCacheError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| RecordCacheError::Config(format!("Failed to read config file: {e}")))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration by file extension (`.json` or `.toml`).
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| RecordCacheError::Config(format!("Invalid TOML format: {e}"))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| RecordCacheError::Config(format!("Invalid JSON format: {e}"))),
        _ => Err(RecordCacheError::Config(format!("Unsupported config format: {extension}"))),
    }
}

/// Probe the standard locations for a config file.
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut roots = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        roots.extend([cwd.clone(), cwd.join(".."), cwd.join("../..")]);
    }
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            roots.push(exe_dir.to_path_buf());
        }
    }

    roots
        .iter()
        .flat_map(|root| CONFIG_FILE_NAMES.iter().map(move |name| root.join(name)))
        .find(|path| path.exists())
}

fn apply_secret_overrides(config: &mut Config) {
    if let Some(token) = env_opt("RECORDCACHE_STORE_API_TOKEN") {
        config.store.api_token = Some(token);
    }
    if let Some(secret) = env_opt("RECORDCACHE_PUSH_SHARED_SECRET") {
        config.push.shared_secret = Some(secret);
    }
}

/// Get required environment variable.
fn env_var(key: &str) -> Result<String> {
    env_opt(key).ok_or_else(|| {
        RecordCacheError::Config(format!("Missing required environment variable: {key}"))
    })
}

/// Optional environment variable; empty counts as unset.
fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    env_opt(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| RecordCacheError::Config(format!("Invalid value for {key}: {e}")))
        })
        .transpose()
}

/// Parse boolean from environment variable.
///
/// Accepts: `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive)
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|s| matches!(s.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
