//! Best-effort secondary index: `(kind, field, value) -> id`
//!
//! Entries are hints. An entry may outlive the primary record it points at,
//! or point at a record whose field has since changed; callers always
//! re-resolve the id through the primary path and check the field.

use std::sync::Arc;
use std::time::Duration;

use recordcache_domain::types::record::payload_id;
use recordcache_domain::{EntityKind, Payload};
use serde_json::Value;
use tracing::{debug, trace};

use super::keys::KeyLayout;
use super::ports::CacheBackend;
use super::ttl;

/// Secondary index reads and writes over a cache backend.
#[derive(Clone)]
pub struct SecondaryIndex {
    backend: Arc<dyn CacheBackend>,
    keys: KeyLayout,
    ttl: Duration,
    jitter: f64,
}

impl SecondaryIndex {
    pub fn new(backend: Arc<dyn CacheBackend>, keys: KeyLayout, ttl: Duration, jitter: f64) -> Self {
        Self { backend, keys, ttl, jitter }
    }

    /// Id last recorded for `field = value`, if any.
    pub async fn lookup(&self, kind: EntityKind, field: &str, value: &str) -> Option<String> {
        let raw = self.backend.get(&self.keys.index(kind, field, value)).await?;
        match String::from_utf8(raw) {
            Ok(id) if !id.is_empty() => Some(id),
            _ => {
                debug!(%kind, field, "discarding undecodable index entry");
                None
            }
        }
    }

    /// Point `field = value` at `id`.
    pub async fn record(&self, kind: EntityKind, field: &str, value: &str, id: &str) {
        let ttl = ttl::jittered(self.ttl, self.jitter);
        self.backend.set(&self.keys.index(kind, field, value), id.as_bytes(), ttl).await;
        trace!(%kind, field, id, "index entry written");
    }

    /// Drop the entry for `field = value`.
    pub async fn forget(&self, kind: EntityKind, field: &str, value: &str) {
        self.backend.delete(&self.keys.index(kind, field, value)).await;
    }

    /// Write entries for every declared indexed field present in `payload`.
    pub async fn record_payload(&self, kind: EntityKind, payload: &Payload) {
        let Some(id) = payload_id(payload) else {
            return;
        };
        for field in kind.spec().indexed_fields {
            if let Some(Value::String(value)) = payload.get(*field) {
                if !value.is_empty() {
                    self.record(kind, field, value, id).await;
                }
            }
        }
    }

    /// Drop entries for every declared indexed field present in `payload`,
    /// but only where they still point at this payload's id.
    pub async fn forget_payload(&self, kind: EntityKind, payload: &Payload) {
        let Some(id) = payload_id(payload) else {
            return;
        };
        for field in kind.spec().indexed_fields {
            if let Some(Value::String(value)) = payload.get(*field) {
                if self.lookup(kind, field, value).await.as_deref() == Some(id) {
                    self.forget(kind, field, value).await;
                }
            }
        }
    }
}
