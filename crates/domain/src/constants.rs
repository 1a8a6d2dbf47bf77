//! Cache-layer constants
//!
//! Centralized location for key prefixes and TTL defaults. The key layout is
//! persisted in the backend, so changing any prefix here orphans existing
//! entries.

// Key layout
pub const KEY_SEPARATOR: char = ':';
pub const TOMBSTONE_PREFIX: &str = "tomb";
pub const INDEX_SEGMENT: &str = "idx";
pub const DEFAULT_SCHEMA_VERSION: &str = "v1";

/// Value stored under a tombstone key. Only presence matters.
pub const TOMBSTONE_MARKER: &[u8] = b"1";

// TTL defaults (seconds)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3600;
pub const DEFAULT_TOMBSTONE_TTL_SECS: u64 = 14_400;
pub const DEFAULT_INDEX_TTL_SECS: u64 = 3600;

/// Half-width of the TTL jitter band: writes land in `[T * 0.95, T * 1.05]`.
pub const DEFAULT_TTL_JITTER: f64 = 0.05;

// Backend defaults
pub const DEFAULT_BACKEND_URL: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_BACKEND_CONNECT_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_BACKEND_OPERATION_TIMEOUT_MS: u64 = 500;
pub const DEFAULT_SCAN_BATCH: usize = 500;

// Record store defaults
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STORE_MAX_ATTEMPTS: usize = 3;
pub const DEFAULT_STORE_REQUESTS_PER_SECOND: u32 = 5;
pub const DEFAULT_STORE_PAGE_SIZE: usize = 100;

// Sweep defaults
pub const DEFAULT_SWEEP_CRON: &str = "0 0 3 * * *";
pub const DEFAULT_SWEEP_JOB_TIMEOUT_SECS: u64 = 1800;
