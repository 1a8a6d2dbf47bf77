//! Port interface for the key-value cache backend

use std::time::Duration;

use async_trait::async_trait;
use recordcache_domain::Result;

/// Remote key-value store with per-key TTL and pattern-based enumeration.
///
/// `get`, `set`, `delete` and `exists` never fail: implementations bound
/// every call with a short timeout and turn any I/O, timeout or decoding
/// failure into "absent" / no-op, logging it. The cache is an optimization
/// and must not become a source of hard failures.
///
/// `ping` and `scan_keys` do report failures. The reconciliation sweep needs
/// to tell "nothing cached" apart from "backend unreachable" before it is
/// allowed to delete anything.
///
/// Atomicity is per key only.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read the raw bytes stored under `key`.
    async fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration);

    /// Remove `key` if present.
    async fn delete(&self, key: &str);

    /// Whether `key` is currently present.
    async fn exists(&self, key: &str) -> bool;

    /// Enumerate keys matching a glob `pattern` such as `v1:users:*`.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<()>;
}
