//! Cache-aside entity operations
//!
//! `EntityCache` owns interpretation of cached bytes: payloads are stored as
//! JSON objects and decoded into the caller's result type on the way out.
//! Backend failures never surface from here; store failures other than
//! not-found do.

use std::sync::Arc;
use std::time::Duration;

use recordcache_domain::types::record::{field_equals, payload_id};
use recordcache_domain::{CacheConfig, EntityKind, Payload, Record, RecordCacheError, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::counters::RequestCounters;
use super::index::SecondaryIndex;
use super::keys::KeyLayout;
use super::ports::CacheBackend;
use super::tombstone::Tombstones;
use super::ttl;
use crate::store::formula::Formula;
use crate::store::ports::{ListQuery, RecordStore};

/// Read-through / write-through access to every entity kind.
///
/// Cheap to clone; clones share the backend and store handles.
#[derive(Clone)]
pub struct EntityCache {
    backend: Arc<dyn CacheBackend>,
    store: Arc<dyn RecordStore>,
    keys: KeyLayout,
    tombstones: Tombstones,
    index: SecondaryIndex,
    ttl: Duration,
    jitter: f64,
}

impl EntityCache {
    /// # Errors
    /// `Config` when `config` does not pass [`CacheConfig::validate`].
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        store: Arc<dyn RecordStore>,
        config: &CacheConfig,
    ) -> Result<Self> {
        config.validate()?;
        let keys = KeyLayout::new(config.schema_version.clone());
        let tombstones = Tombstones::new(
            Arc::clone(&backend),
            keys.clone(),
            config.tombstone_ttl(),
            config.jitter,
        );
        let index =
            SecondaryIndex::new(Arc::clone(&backend), keys.clone(), config.index_ttl(), config.jitter);

        Ok(Self { backend, store, keys, tombstones, index, ttl: config.ttl(), jitter: config.jitter })
    }

    pub fn keys(&self) -> &KeyLayout {
        &self.keys
    }

    pub fn tombstones(&self) -> &Tombstones {
        &self.tombstones
    }

    pub fn index(&self) -> &SecondaryIndex {
        &self.index
    }

    /* ---------------------------------------------------------------------- */
    /* Reads */
    /* ---------------------------------------------------------------------- */

    /// Fetch one record by id.
    ///
    /// Returns `Ok(None)` when the record is tombstoned or the store reports
    /// it missing (which tombstones it).
    ///
    /// # Errors
    /// Store errors other than not-found, and `Validation` when a freshly
    /// fetched record does not decode into `T`.
    #[instrument(skip(self, counters), fields(kind = %kind))]
    pub async fn get_one<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        id: &str,
        counters: &RequestCounters,
    ) -> Result<Option<T>> {
        Ok(self.resolve(kind, id, counters).await?.map(|(value, _)| value))
    }

    /// Fetch several records in input order, dropping the ones not found.
    ///
    /// # Errors
    /// The first store error encountered.
    pub async fn get_many_by_ids<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        ids: &[&str],
        counters: &RequestCounters,
    ) -> Result<Vec<T>> {
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(value) = self.get_one(kind, id, counters).await? {
                found.push(value);
            }
        }
        Ok(found)
    }

    /// First record matching `formula`, always read from the store.
    ///
    /// # Errors
    /// Store errors, or `Validation` when the record does not decode.
    #[instrument(skip(self, counters), fields(kind = %kind, formula = %formula))]
    pub async fn get_by_formula<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        formula: &Formula,
        counters: &RequestCounters,
    ) -> Result<Option<T>> {
        let query = ListQuery::filtered(formula.clone()).with_max_records(1);
        let mut found = self.query(kind, &query, counters).await?;
        match found.pop() {
            Some(payload) => decode_fetched(kind, payload).map(Some),
            None => Ok(None),
        }
    }

    /// Every record matching `formula`, always read from the store.
    ///
    /// # Errors
    /// Store errors, or `Validation` when any record does not decode.
    #[instrument(skip(self, counters), fields(kind = %kind, formula = %formula))]
    pub async fn get_many_by_formula<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        formula: &Formula,
        counters: &RequestCounters,
    ) -> Result<Vec<T>> {
        let query = ListQuery::filtered(formula.clone());
        self.query(kind, &query, counters)
            .await?
            .into_iter()
            .map(|payload| decode_fetched(kind, payload))
            .collect()
    }

    /// Look a record up by a declared indexed field.
    ///
    /// An index hit is re-resolved through the primary path; if the
    /// resolved record is gone or no longer carries `value`, the entry is
    /// stale and the lookup falls back to a formula query, which repopulates
    /// both the primary entry and the index.
    ///
    /// # Errors
    /// `InvalidInput` when `field` is not indexed for `kind`, otherwise as
    /// [`Self::get_by_formula`].
    #[instrument(skip(self, counters), fields(kind = %kind))]
    pub async fn get_by_secondary_index<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        field: &str,
        value: &str,
        counters: &RequestCounters,
    ) -> Result<Option<T>> {
        if !kind.spec().is_indexed(field) {
            return Err(RecordCacheError::InvalidInput(format!(
                "{field} is not an indexed field of {kind}"
            )));
        }

        if let Some(id) = self.index.lookup(kind, field, value).await {
            match self.resolve::<T>(kind, &id, counters).await? {
                Some((found, payload)) if field_equals(&payload, field, value) => {
                    return Ok(Some(found));
                }
                _ => {
                    debug!(%kind, field, id, "stale index entry");
                    self.index.forget(kind, field, value).await;
                }
            }
        }

        let query = ListQuery::filtered(Formula::eq(field, value)).with_max_records(1);
        let Some(payload) = self.query(kind, &query, counters).await?.pop() else {
            return Ok(None);
        };
        if let Some(id) = payload_id(&payload) {
            self.index.record(kind, field, value, id).await;
        }
        decode_fetched(kind, payload).map(Some)
    }

    /* ---------------------------------------------------------------------- */
    /* Writes */
    /* ---------------------------------------------------------------------- */

    /// Overwrite the primary entry for the payload's id and refresh its
    /// index entries. Accepts flattened payloads and the store's
    /// `{ id, fields }` shape.
    ///
    /// # Errors
    /// `InvalidInput` when the payload carries no id.
    #[instrument(skip(self, payload), fields(kind = %kind))]
    pub async fn upsert(&self, kind: EntityKind, payload: Payload) -> Result<()> {
        let record = Record::from_payload(payload, "");
        if record.id.is_empty() {
            return Err(RecordCacheError::InvalidInput(format!("{kind} payload has no id")));
        }
        let payload = record.into_payload();
        self.write_primary(kind, &payload).await;
        self.index.record_payload(kind, &payload).await;
        Ok(())
    }

    /// Drop the primary entry so the next read refetches. No tombstone.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn invalidate(&self, kind: EntityKind, id: &str) {
        self.backend.delete(&self.keys.primary(kind, id)).await;
        debug!(%kind, id, "invalidated");
    }

    /// Delete at the store, then evict and tombstone.
    ///
    /// A store not-found still evicts and tombstones, since the record is
    /// gone either way.
    ///
    /// # Errors
    /// Any other store error, in which case the cache is left untouched.
    #[instrument(skip(self), fields(kind = %kind))]
    pub async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        match self.store.delete(kind, id).await {
            Ok(()) => {}
            Err(err) if err.is_not_found() => debug!(%kind, id, "already absent at store"),
            Err(err) => return Err(err),
        }

        if let Some(payload) = self.read_primary(kind, id).await {
            self.index.forget_payload(kind, &payload).await;
        }
        self.invalidate(kind, id).await;
        self.tombstones.bury(kind, id).await;
        Ok(())
    }

    /// Create at the store and cache the result.
    ///
    /// # Errors
    /// Store errors.
    #[instrument(skip(self, fields), fields(kind = %kind))]
    pub async fn create(&self, kind: EntityKind, fields: Payload) -> Result<Record> {
        let record = self.store.create(kind, fields).await?;
        let payload = record.clone().into_payload();
        self.write_primary(kind, &payload).await;
        self.index.record_payload(kind, &payload).await;
        Ok(record)
    }

    /// Update at the store and invalidate the cached copy.
    ///
    /// # Errors
    /// Store errors; the cached copy is kept when the update fails.
    #[instrument(skip(self, fields), fields(kind = %kind))]
    pub async fn update(&self, kind: EntityKind, id: &str, fields: Payload) -> Result<Record> {
        let record = self.store.update(kind, id, fields).await?;
        self.invalidate(kind, id).await;
        Ok(record)
    }

    /* ---------------------------------------------------------------------- */
    /* Internals */
    /* ---------------------------------------------------------------------- */

    /// Tombstone, then cache, then store. Returns the decoded value along
    /// with the payload it came from.
    async fn resolve<T: DeserializeOwned>(
        &self,
        kind: EntityKind,
        id: &str,
        counters: &RequestCounters,
    ) -> Result<Option<(T, Payload)>> {
        if self.tombstones.is_tombstoned(kind, id).await {
            counters.record_hit();
            debug!(%kind, id, "tombstone hit");
            return Ok(None);
        }

        if let Some(payload) = self.read_primary(kind, id).await {
            match decode::<T>(&payload) {
                Ok(value) => {
                    counters.record_hit();
                    debug!(%kind, id, "cache hit");
                    return Ok(Some((value, payload)));
                }
                Err(err) => {
                    debug!(%kind, id, error = %err, "cached payload failed validation, refetching");
                }
            }
        }

        counters.record_miss();
        debug!(%kind, id, "cache miss");
        match self.store.get(kind, id).await {
            Ok(record) => {
                let payload = record.into_payload();
                self.write_primary(kind, &payload).await;
                let value = decode::<T>(&payload).map_err(|err| validation_error(kind, &err))?;
                Ok(Some((value, payload)))
            }
            Err(err) if err.is_not_found() => {
                self.tombstones.bury(kind, id).await;
                Ok(None)
            }
            Err(err) => {
                warn!(%kind, id, error = %err, "record store fetch failed");
                Err(err)
            }
        }
    }

    /// List from the store and warm the primary cache with every result.
    async fn query(
        &self,
        kind: EntityKind,
        query: &ListQuery,
        counters: &RequestCounters,
    ) -> Result<Vec<Payload>> {
        counters.record_bypass();
        let records = self.store.list(kind, query).await?;
        let mut payloads = Vec::with_capacity(records.len());
        for record in records {
            let payload = record.into_payload();
            self.write_primary(kind, &payload).await;
            payloads.push(payload);
        }
        Ok(payloads)
    }

    async fn read_primary(&self, kind: EntityKind, id: &str) -> Option<Payload> {
        let raw = self.backend.get(&self.keys.primary(kind, id)).await?;
        match serde_json::from_slice::<Payload>(&raw) {
            Ok(payload) => Some(payload),
            Err(err) => {
                debug!(%kind, id, error = %err, "discarding undecodable cache entry");
                None
            }
        }
    }

    async fn write_primary(&self, kind: EntityKind, payload: &Payload) {
        let Some(id) = payload_id(payload) else {
            return;
        };
        match serde_json::to_vec(payload) {
            Ok(bytes) => {
                let ttl = ttl::jittered(self.ttl, self.jitter);
                self.backend.set(&self.keys.primary(kind, id), &bytes, ttl).await;
            }
            Err(err) => warn!(%kind, id, error = %err, "failed to encode payload"),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: &Payload) -> serde_json::Result<T> {
    serde_json::from_value(Value::Object(payload.clone()))
}

fn decode_fetched<T: DeserializeOwned>(kind: EntityKind, payload: Payload) -> Result<T> {
    serde_json::from_value(Value::Object(payload)).map_err(|err| validation_error(kind, &err))
}

fn validation_error(kind: EntityKind, err: &serde_json::Error) -> RecordCacheError {
    RecordCacheError::Validation(format!("{kind} record does not match the requested shape: {err}"))
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;
    use crate::store::InstrumentedRecordStore;
    use crate::testing::{payload, FakeCacheBackend, FakeRecordStore};

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: String,
        email: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Event {
        id: String,
        name: String,
    }

    struct Harness {
        backend: Arc<FakeCacheBackend>,
        store: Arc<InstrumentedRecordStore<FakeRecordStore>>,
        cache: EntityCache,
        config: CacheConfig,
    }

    fn harness() -> Harness {
        let backend = Arc::new(FakeCacheBackend::new());
        let store = Arc::new(InstrumentedRecordStore::new(FakeRecordStore::new()));
        let config = CacheConfig::default();
        let cache = EntityCache::new(backend.clone(), store.clone(), &config).unwrap();
        Harness { backend, store, cache, config }
    }

    fn seed_user(h: &Harness, id: &str, email: &str) {
        h.store.inner().insert(EntityKind::Users, id, payload(json!({ "email": email })));
    }

    #[test]
    fn rejects_tombstones_shorter_than_cache_ttl() {
        let backend = Arc::new(FakeCacheBackend::new());
        let store = Arc::new(FakeRecordStore::new());
        let config = CacheConfig { ttl_secs: 3600, tombstone_ttl_secs: 10, ..Default::default() };

        let result = EntityCache::new(backend, store, &config);
        assert!(matches!(result, Err(RecordCacheError::Config(_))));
    }

    #[test]
    fn rejects_jitter_outside_band() {
        let backend = Arc::new(FakeCacheBackend::new());
        let store = Arc::new(FakeRecordStore::new());

        for jitter in [5.0, f64::NAN, -0.1] {
            let config = CacheConfig { jitter, ..Default::default() };
            let result = EntityCache::new(backend.clone(), store.clone(), &config);
            assert!(matches!(result, Err(RecordCacheError::Config(_))), "jitter {jitter} accepted");
        }
    }

    #[tokio::test]
    async fn second_read_is_a_hit_with_equal_payload() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        let counters = RequestCounters::new();

        let first: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
        let second: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.unwrap().email, "a@b.com");
        assert_eq!(h.store.counts().gets, 1);
        let snapshot = counters.snapshot();
        assert_eq!((snapshot.hits, snapshot.misses), (1, 1));
    }

    #[tokio::test]
    async fn store_not_found_tombstones_and_suppresses_refetch() {
        let h = harness();
        let counters = RequestCounters::new();

        let first: Option<Event> =
            h.cache.get_one(EntityKind::Events, "rec123", &counters).await.unwrap();
        assert!(first.is_none());
        assert!(h.backend.contains("tomb:events:rec123"));
        assert_eq!(h.store.counts().gets, 1);

        let second: Option<Event> =
            h.cache.get_one(EntityKind::Events, "rec123", &counters).await.unwrap();
        assert!(second.is_none());
        assert_eq!(h.store.counts().gets, 1);
        assert_eq!(counters.snapshot().hits, 1);
    }

    #[tokio::test]
    async fn delete_suppresses_store_calls_until_tombstone_expires() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        let counters = RequestCounters::new();
        let _: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();

        h.cache.delete(EntityKind::Users, "usr1").await.unwrap();
        h.store.reset();

        for _ in 0..5 {
            let found: Option<User> =
                h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
            assert!(found.is_none());
        }
        assert_eq!(h.store.counts().total(), 0);
        assert!(!h.backend.contains("v1:users:usr1"));

        h.backend.advance(h.config.tombstone_ttl().mul_f64(1.0 + h.config.jitter));
        let _: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
        assert_eq!(h.store.counts().gets, 1);
    }

    #[tokio::test]
    async fn delete_drops_index_entry_pointing_at_record() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        let counters = RequestCounters::new();
        let _: Option<User> = h
            .cache
            .get_by_secondary_index(EntityKind::Users, "email", "a@b.com", &counters)
            .await
            .unwrap();
        assert!(h.backend.contains("v1:idx:users:email:a@b.com"));

        h.cache.delete(EntityKind::Users, "usr1").await.unwrap();
        assert!(!h.backend.contains("v1:idx:users:email:a@b.com"));
        assert!(h.backend.contains("tomb:users:usr1"));
    }

    #[tokio::test]
    async fn delete_propagates_store_errors_without_touching_cache() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        let counters = RequestCounters::new();
        let _: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
        h.store.inner().fail_record(
            EntityKind::Users,
            "usr1",
            RecordCacheError::RateLimited("slow down".into()),
        );

        let err = h.cache.delete(EntityKind::Users, "usr1").await.unwrap_err();
        assert!(matches!(err, RecordCacheError::RateLimited(_)));
        assert!(h.backend.contains("v1:users:usr1"));
        assert!(!h.backend.contains("tomb:users:usr1"));
    }

    #[tokio::test]
    async fn transient_store_errors_propagate() {
        let h = harness();
        h.store.inner().fail_record(
            EntityKind::Projects,
            "prj1",
            RecordCacheError::Network("connection reset".into()),
        );
        let counters = RequestCounters::new();

        let result: Result<Option<Value>> =
            h.cache.get_one(EntityKind::Projects, "prj1", &counters).await;
        assert!(matches!(result, Err(RecordCacheError::Network(_))));
        assert!(!h.backend.contains("tomb:projects:prj1"));
    }

    #[tokio::test]
    async fn cached_payload_failing_validation_is_refetched_once() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        h.backend.insert_raw("v1:users:usr1", br#"{"id":"usr1"}"#, Duration::from_secs(60));
        let counters = RequestCounters::new();

        let user: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
        assert_eq!(user.unwrap().email, "a@b.com");
        assert_eq!(h.store.counts().gets, 1);

        let again: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
        assert!(again.is_some());
        assert_eq!(h.store.counts().gets, 1);
    }

    #[tokio::test]
    async fn fetched_payload_failing_validation_is_an_error() {
        let h = harness();
        h.store.inner().insert(EntityKind::Users, "usr1", payload(json!({ "name": "no email" })));
        let counters = RequestCounters::new();

        let result: Result<Option<User>> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await;
        assert!(matches!(result, Err(RecordCacheError::Validation(_))));
    }

    #[tokio::test]
    async fn backend_outage_degrades_to_store_reads() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        h.backend.set_unavailable(true);
        let counters = RequestCounters::new();

        for _ in 0..2 {
            let user: Option<User> =
                h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
            assert!(user.is_some());
        }
        assert_eq!(h.store.counts().gets, 2);
        assert_eq!(counters.snapshot().misses, 2);
    }

    #[tokio::test]
    async fn get_many_by_ids_preserves_order_and_drops_misses() {
        let h = harness();
        seed_user(&h, "usr1", "one@b.com");
        seed_user(&h, "usr3", "three@b.com");
        let counters = RequestCounters::new();

        let users: Vec<User> = h
            .cache
            .get_many_by_ids(EntityKind::Users, &["usr3", "usr2", "usr1"], &counters)
            .await
            .unwrap();
        let ids: Vec<&str> = users.iter().map(|u| u.id.as_str()).collect();
        assert_eq!(ids, vec!["usr3", "usr1"]);
        assert!(h.backend.contains("tomb:users:usr2"));
    }

    #[tokio::test]
    async fn formula_queries_bypass_cache_and_warm_primary_entries() {
        let h = harness();
        h.store.inner().insert(EntityKind::Events, "evt1", payload(json!({ "name": "Hack", "city": "Oslo" })));
        h.store.inner().insert(EntityKind::Events, "evt2", payload(json!({ "name": "Jam", "city": "Oslo" })));
        h.store.inner().insert(EntityKind::Events, "evt3", payload(json!({ "name": "Con", "city": "Rome" })));
        let counters = RequestCounters::new();

        let events: Vec<Event> = h
            .cache
            .get_many_by_formula(EntityKind::Events, &Formula::eq("city", "Oslo"), &counters)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(counters.snapshot().bypasses, 1);

        let warmed: Option<Event> = h.cache.get_one(EntityKind::Events, "evt2", &counters).await.unwrap();
        assert_eq!(warmed.unwrap().name, "Jam");
        assert_eq!(h.store.counts().gets, 0);

        let first: Option<Event> = h
            .cache
            .get_by_formula(EntityKind::Events, &Formula::eq("city", "Rome"), &counters)
            .await
            .unwrap();
        assert_eq!(first.unwrap().id, "evt3");
        assert_eq!(h.store.counts().lists, 2);
    }

    #[tokio::test]
    async fn secondary_index_warms_up_after_one_formula_query() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        let counters = RequestCounters::new();

        let first: Option<User> = h
            .cache
            .get_by_secondary_index(EntityKind::Users, "email", "a@b.com", &counters)
            .await
            .unwrap();
        assert_eq!(first.unwrap().id, "usr1");
        assert_eq!(h.store.counts().lists, 1);
        assert_eq!(h.backend.raw("v1:idx:users:email:a@b.com"), Some(b"usr1".to_vec()));
        assert!(h.backend.contains("v1:users:usr1"));

        let second: Option<User> = h
            .cache
            .get_by_secondary_index(EntityKind::Users, "email", "a@b.com", &counters)
            .await
            .unwrap();
        assert_eq!(second.unwrap().id, "usr1");
        assert_eq!(h.store.counts().lists, 1);
        assert_eq!(h.store.counts().gets, 0);
    }

    #[tokio::test]
    async fn stale_index_entry_falls_back_to_formula() {
        let h = harness();
        seed_user(&h, "usr1", "old@b.com");
        seed_user(&h, "usr2", "a@b.com");
        h.backend.insert_raw("v1:idx:users:email:a@b.com", b"usr1", Duration::from_secs(60));
        let counters = RequestCounters::new();

        let found: Option<User> = h
            .cache
            .get_by_secondary_index(EntityKind::Users, "email", "a@b.com", &counters)
            .await
            .unwrap();
        assert_eq!(found.unwrap().id, "usr2");
        assert_eq!(h.backend.raw("v1:idx:users:email:a@b.com"), Some(b"usr2".to_vec()));
    }

    #[tokio::test]
    async fn secondary_index_rejects_undeclared_fields() {
        let h = harness();
        let counters = RequestCounters::new();
        let result: Result<Option<User>> = h
            .cache
            .get_by_secondary_index(EntityKind::Users, "name", "Ada", &counters)
            .await;
        assert!(matches!(result, Err(RecordCacheError::InvalidInput(_))));
        assert_eq!(h.store.counts().total(), 0);
    }

    #[tokio::test]
    async fn upsert_overwrites_and_indexes() {
        let h = harness();
        let counters = RequestCounters::new();

        h.cache
            .upsert(EntityKind::Users, payload(json!({ "id": "usr9", "email": "z@b.com", "bio": null })))
            .await
            .unwrap();

        let user: Option<User> = h.cache.get_one(EntityKind::Users, "usr9", &counters).await.unwrap();
        assert_eq!(user.unwrap().email, "z@b.com");
        assert_eq!(h.backend.raw("v1:idx:users:email:z@b.com"), Some(b"usr9".to_vec()));
        assert_eq!(h.store.counts().total(), 0);

        let missing_id = h.cache.upsert(EntityKind::Users, payload(json!({ "email": "x" }))).await;
        assert!(matches!(missing_id, Err(RecordCacheError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn upsert_keeps_a_payload_field_named_fields() {
        let h = harness();
        let counters = RequestCounters::new();

        h.cache
            .upsert(
                EntityKind::Projects,
                payload(json!({ "id": "prj4", "name": "Forms", "fields": { "title": "text" } })),
            )
            .await
            .unwrap();

        let project: Option<Value> =
            h.cache.get_one(EntityKind::Projects, "prj4", &counters).await.unwrap();
        let project = project.unwrap();
        assert_eq!(project["name"], json!("Forms"));
        assert_eq!(project["fields"], json!({ "title": "text" }));
    }

    #[tokio::test]
    async fn writes_use_jittered_ttls_within_band() {
        let h = harness();
        for n in 0..50 {
            let id = format!("usr{n}");
            h.cache
                .upsert(EntityKind::Users, payload(json!({ "id": id, "email": format!("{n}@b.com") })))
                .await
                .unwrap();
            let ttl = h.backend.last_ttl(&format!("v1:users:{id}")).unwrap();
            assert!(ttl >= h.config.ttl().mul_f64(0.95) && ttl <= h.config.ttl().mul_f64(1.05));
        }
    }

    #[tokio::test]
    async fn invalidate_forces_refetch_without_tombstone() {
        let h = harness();
        seed_user(&h, "usr1", "a@b.com");
        let counters = RequestCounters::new();
        let _: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();

        h.cache.invalidate(EntityKind::Users, "usr1").await;
        assert!(!h.backend.contains("v1:users:usr1"));
        assert!(!h.backend.contains("tomb:users:usr1"));

        let _: Option<User> = h.cache.get_one(EntityKind::Users, "usr1", &counters).await.unwrap();
        assert_eq!(h.store.counts().gets, 2);
    }

    #[tokio::test]
    async fn create_caches_and_update_invalidates() {
        let h = harness();
        let counters = RequestCounters::new();

        let created =
            h.cache.create(EntityKind::Users, payload(json!({ "email": "new@b.com" }))).await.unwrap();
        let cached: Option<User> =
            h.cache.get_one(EntityKind::Users, &created.id, &counters).await.unwrap();
        assert_eq!(cached.unwrap().email, "new@b.com");
        assert_eq!(h.store.counts().gets, 0);

        h.cache
            .update(EntityKind::Users, &created.id, payload(json!({ "email": "newer@b.com" })))
            .await
            .unwrap();
        let refreshed: Option<User> =
            h.cache.get_one(EntityKind::Users, &created.id, &counters).await.unwrap();
        assert_eq!(refreshed.unwrap().email, "newer@b.com");
        assert_eq!(h.store.counts().gets, 1);
    }
}
