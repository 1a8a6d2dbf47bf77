//! Process-local cache backend on moka
//!
//! Each entry carries its own TTL through a moka [`Expiry`] policy. Nothing
//! here can fail, so `ping` and `scan_keys` always succeed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::future::Cache;
use moka::Expiry;
use recordcache_core::cache::glob_matches;
use recordcache_core::CacheBackend;
use recordcache_domain::Result;

/// Default entry bound for the in-memory backend.
pub const DEFAULT_MEMORY_CAPACITY: u64 = 100_000;

#[derive(Clone)]
struct Entry {
    bytes: Arc<[u8]>,
    ttl: Duration,
}

struct PerEntryTtl;

impl Expiry<String, Entry> for PerEntryTtl {
    fn expire_after_create(&self, _key: &String, value: &Entry, _created_at: Instant) -> Option<Duration> {
        Some(value.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(value.ttl)
    }
}

/// In-memory [`CacheBackend`] with per-key TTL.
#[derive(Clone)]
pub struct MemoryCacheBackend {
    cache: Cache<String, Entry>,
}

impl MemoryCacheBackend {
    pub fn new(max_capacity: u64) -> Self {
        let cache = Cache::builder().max_capacity(max_capacity).expire_after(PerEntryTtl).build();
        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MEMORY_CAPACITY)
    }
}

#[async_trait]
impl CacheBackend for MemoryCacheBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.cache.get(key).await.map(|entry| entry.bytes.to_vec())
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        self.cache.insert(key.to_string(), Entry { bytes: Arc::from(value), ttl }).await;
    }

    async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    async fn exists(&self, key: &str) -> bool {
        self.cache.get(key).await.is_some()
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .cache
            .iter()
            .filter(|(key, _)| glob_matches(pattern, key))
            .map(|(key, _)| key.as_ref().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}
