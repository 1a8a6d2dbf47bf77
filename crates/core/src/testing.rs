//! Deterministic fakes for tests
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream crates. Neither fake touches the network or the wall clock.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use recordcache_domain::{EntityKind, Payload, Record, RecordCacheError, Result};
use serde_json::Value;

use crate::cache::keys::glob_matches;
use crate::cache::ports::CacheBackend;
use crate::store::ports::{ListQuery, RecordStore};

/// Build a payload from a JSON object literal; non-objects yield an empty map.
pub fn payload(value: Value) -> Payload {
    match value {
        Value::Object(map) => map,
        _ => Payload::new(),
    }
}

/* -------------------------------------------------------------------------- */
/* Fake cache backend */
/* -------------------------------------------------------------------------- */

#[derive(Default)]
struct BackendState {
    now: Duration,
    entries: HashMap<String, (Vec<u8>, Duration)>,
    last_ttl: HashMap<String, Duration>,
    unavailable: bool,
}

impl BackendState {
    fn live(&self, key: &str) -> Option<&Vec<u8>> {
        self.entries.get(key).filter(|(_, expires_at)| *expires_at > self.now).map(|(value, _)| value)
    }
}

/// In-memory backend with a virtual clock and an outage switch.
#[derive(Default)]
pub struct FakeCacheBackend {
    state: Mutex<BackendState>,
}

impl FakeCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the virtual clock forward; entries past their TTL disappear.
    pub fn advance(&self, by: Duration) {
        self.state.lock().now += by;
    }

    /// Simulate the backend going away (or coming back).
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    /// Whether `key` holds a live entry, ignoring the outage switch.
    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().live(key).is_some()
    }

    /// Raw bytes under `key`, ignoring the outage switch.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.state.lock().live(key).cloned()
    }

    /// TTL passed to the most recent write of `key`.
    pub fn last_ttl(&self, key: &str) -> Option<Duration> {
        self.state.lock().last_ttl.get(key).copied()
    }

    /// Seed an entry directly, ignoring the outage switch.
    pub fn insert_raw(&self, key: &str, value: &[u8], ttl: Duration) {
        let mut state = self.state.lock();
        let expires_at = state.now + ttl;
        state.entries.insert(key.to_string(), (value.to_vec(), expires_at));
        state.last_ttl.insert(key.to_string(), ttl);
    }

    /// All live keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut keys: Vec<String> =
            state.entries.keys().filter(|key| state.live(key).is_some()).cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl CacheBackend for FakeCacheBackend {
    async fn get(&self, key: &str) -> Option<Vec<u8>> {
        let state = self.state.lock();
        if state.unavailable {
            return None;
        }
        state.live(key).cloned()
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) {
        if self.state.lock().unavailable {
            return;
        }
        self.insert_raw(key, value, ttl);
    }

    async fn delete(&self, key: &str) {
        let mut state = self.state.lock();
        if !state.unavailable {
            state.entries.remove(key);
        }
    }

    async fn exists(&self, key: &str) -> bool {
        let state = self.state.lock();
        !state.unavailable && state.live(key).is_some()
    }

    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        if self.state.lock().unavailable {
            return Err(RecordCacheError::Backend("fake backend unavailable".into()));
        }
        Ok(self.keys().into_iter().filter(|key| glob_matches(pattern, key)).collect())
    }

    async fn ping(&self) -> Result<()> {
        if self.state.lock().unavailable {
            return Err(RecordCacheError::Backend("fake backend unavailable".into()));
        }
        Ok(())
    }
}

/* -------------------------------------------------------------------------- */
/* Fake record store */
/* -------------------------------------------------------------------------- */

/// In-memory record store with injectable per-record failures.
///
/// Wrap it in [`crate::InstrumentedRecordStore`] to count calls.
#[derive(Default)]
pub struct FakeRecordStore {
    records: Mutex<BTreeMap<(EntityKind, String), Payload>>,
    failures: Mutex<HashMap<(EntityKind, String), RecordCacheError>>,
    list_failure: Mutex<Option<RecordCacheError>>,
    next_id: AtomicU64,
}

impl FakeRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, kind: EntityKind, id: &str, fields: Payload) {
        self.records.lock().insert((kind, id.to_string()), fields);
    }

    /// Delete a record without going through the cache.
    pub fn remove(&self, kind: EntityKind, id: &str) {
        self.records.lock().remove(&(kind, id.to_string()));
    }

    pub fn contains(&self, kind: EntityKind, id: &str) -> bool {
        self.records.lock().contains_key(&(kind, id.to_string()))
    }

    /// Make every `get`/`update`/`delete` of `(kind, id)` fail with `error`.
    pub fn fail_record(&self, kind: EntityKind, id: &str, error: RecordCacheError) {
        self.failures.lock().insert((kind, id.to_string()), error);
    }

    /// Make every `list` fail with `error`.
    pub fn fail_lists(&self, error: RecordCacheError) {
        *self.list_failure.lock() = Some(error);
    }

    fn injected(&self, kind: EntityKind, id: &str) -> Result<()> {
        match self.failures.lock().get(&(kind, id.to_string())) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn not_found(kind: EntityKind, id: &str) -> RecordCacheError {
        RecordCacheError::NotFound(format!("{kind}/{id}"))
    }
}

#[async_trait]
impl RecordStore for FakeRecordStore {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Record> {
        self.injected(kind, id)?;
        self.records
            .lock()
            .get(&(kind, id.to_string()))
            .map(|fields| Record::new(id, fields.clone()))
            .ok_or_else(|| Self::not_found(kind, id))
    }

    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>> {
        if let Some(error) = self.list_failure.lock().clone() {
            return Err(error);
        }
        let limit = query.max_records.unwrap_or(usize::MAX);
        Ok(self
            .records
            .lock()
            .iter()
            .filter(|((record_kind, _), _)| *record_kind == kind)
            .filter(|(_, fields)| query.filter.as_ref().map_or(true, |f| f.matches(fields)))
            .take(limit)
            .map(|((_, id), fields)| Record::new(id.clone(), fields.clone()))
            .collect())
    }

    async fn create(&self, kind: EntityKind, fields: Payload) -> Result<Record> {
        let id = format!("rec{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        self.insert(kind, &id, fields.clone());
        Ok(Record::new(id, fields))
    }

    async fn update(&self, kind: EntityKind, id: &str, fields: Payload) -> Result<Record> {
        self.injected(kind, id)?;
        let mut records = self.records.lock();
        let existing =
            records.get_mut(&(kind, id.to_string())).ok_or_else(|| Self::not_found(kind, id))?;
        existing.extend(fields);
        Ok(Record::new(id, existing.clone()))
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.injected(kind, id)?;
        self.records
            .lock()
            .remove(&(kind, id.to_string()))
            .map(|_| ())
            .ok_or_else(|| Self::not_found(kind, id))
    }
}
