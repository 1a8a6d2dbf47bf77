//! Call-counting wrapper around a record store
//!
//! Wraps any [`RecordStore`] by composition and counts calls per operation,
//! so tests and diagnostics can assert exactly how many store round trips a
//! cache operation cost.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use recordcache_domain::{EntityKind, Payload, Record, Result};
use tracing::trace;

use super::ports::{ListQuery, RecordStore};

/// Record store decorator that counts calls.
#[derive(Debug, Default)]
pub struct InstrumentedRecordStore<S> {
    inner: S,
    gets: AtomicUsize,
    lists: AtomicUsize,
    creates: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

/// Snapshot of store call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreCallCounts {
    pub gets: usize,
    pub lists: usize,
    pub creates: usize,
    pub updates: usize,
    pub deletes: usize,
}

impl StoreCallCounts {
    pub fn total(&self) -> usize {
        self.gets + self.lists + self.creates + self.updates + self.deletes
    }
}

impl<S: RecordStore> InstrumentedRecordStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            lists: AtomicUsize::new(0),
            creates: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn counts(&self) -> StoreCallCounts {
        StoreCallCounts {
            gets: self.gets.load(Ordering::SeqCst),
            lists: self.lists.load(Ordering::SeqCst),
            creates: self.creates.load(Ordering::SeqCst),
            updates: self.updates.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn reset(&self) {
        for counter in [&self.gets, &self.lists, &self.creates, &self.updates, &self.deletes] {
            counter.store(0, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl<S: RecordStore> RecordStore for InstrumentedRecordStore<S> {
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Record> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        trace!(%kind, id, "store.get");
        self.inner.get(kind, id).await
    }

    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        trace!(%kind, filter = ?query.filter, "store.list");
        self.inner.list(kind, query).await
    }

    async fn create(&self, kind: EntityKind, fields: Payload) -> Result<Record> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        trace!(%kind, "store.create");
        self.inner.create(kind, fields).await
    }

    async fn update(&self, kind: EntityKind, id: &str, fields: Payload) -> Result<Record> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        trace!(%kind, id, "store.update");
        self.inner.update(kind, id, fields).await
    }

    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        trace!(%kind, id, "store.delete");
        self.inner.delete(kind, id).await
    }
}
