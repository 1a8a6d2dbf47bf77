//! Port interface for the authoritative record store

use async_trait::async_trait;
use recordcache_domain::{EntityKind, Payload, Record, Result};

use super::formula::Formula;

/// Parameters for a `list` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Only return records matching this predicate.
    pub filter: Option<Formula>,
    /// Stop after this many records (across pages).
    pub max_records: Option<usize>,
}

impl ListQuery {
    pub fn filtered(filter: Formula) -> Self {
        Self { filter: Some(filter), max_records: None }
    }

    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max);
        self
    }
}

/// The slow, paginated, rate-limited system of record.
///
/// Implementations own their retry budget; errors returned here have
/// already exhausted it.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch one record. Returns `RecordCacheError::NotFound` when the store
    /// authoritatively reports the id as absent.
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Record>;

    /// List records, following pagination until exhausted or `max_records`.
    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>>;

    /// Create a record and return it as stored.
    async fn create(&self, kind: EntityKind, fields: Payload) -> Result<Record>;

    /// Patch a record's fields and return it as stored.
    async fn update(&self, kind: EntityKind, id: &str, fields: Payload) -> Result<Record>;

    /// Delete a record.
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()>;
}
