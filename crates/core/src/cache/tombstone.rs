//! Tombstones: cached proof that a record is absent at the source
//!
//! ```text
//! absent --(store says not found | explicit delete)--> tombstoned(ttl) --(expiry)--> absent
//! ```
//!
//! While a tombstone exists no store call is made for that id. There is no
//! path from tombstoned back to live inside the TTL window: a record
//! recreated at the source under the same id stays invisible until the
//! tombstone expires. The source never reuses ids, so this is accepted.

use std::sync::Arc;
use std::time::Duration;

use recordcache_domain::constants::TOMBSTONE_MARKER;
use recordcache_domain::EntityKind;
use tracing::debug;

use super::keys::KeyLayout;
use super::ports::CacheBackend;
use super::ttl;

/// Tombstone reads and writes over a cache backend.
#[derive(Clone)]
pub struct Tombstones {
    backend: Arc<dyn CacheBackend>,
    keys: KeyLayout,
    ttl: Duration,
    jitter: f64,
}

impl Tombstones {
    pub fn new(backend: Arc<dyn CacheBackend>, keys: KeyLayout, ttl: Duration, jitter: f64) -> Self {
        Self { backend, keys, ttl, jitter }
    }

    /// Whether `(kind, id)` is currently tombstoned.
    pub async fn is_tombstoned(&self, kind: EntityKind, id: &str) -> bool {
        self.backend.exists(&self.keys.tombstone(kind, id)).await
    }

    /// Record that `(kind, id)` is confirmed absent.
    pub async fn bury(&self, kind: EntityKind, id: &str) {
        let ttl = ttl::jittered(self.ttl, self.jitter);
        self.backend.set(&self.keys.tombstone(kind, id), TOMBSTONE_MARKER, ttl).await;
        debug!(%kind, id, ttl_secs = ttl.as_secs(), "tombstone set");
    }
}
