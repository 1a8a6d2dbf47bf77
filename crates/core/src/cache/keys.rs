//! Cache key layout
//!
//! ```text
//! primary    {schemaVersion}:{kind}:{id}
//! tombstone  tomb:{kind}:{id}
//! index      {schemaVersion}:idx:{kind}:{field}:{value}   -> raw id
//! ```
//!
//! Tombstones are deliberately unversioned: a schema bump changes payload
//! shape, not record existence.

use recordcache_domain::constants::{INDEX_SEGMENT, TOMBSTONE_PREFIX};
use recordcache_domain::EntityKind;

/// Builds and parses cache keys for one schema version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    schema_version: String,
}

impl KeyLayout {
    pub fn new(schema_version: impl Into<String>) -> Self {
        Self { schema_version: schema_version.into() }
    }

    pub fn primary(&self, kind: EntityKind, id: &str) -> String {
        format!("{}:{}:{}", self.schema_version, kind, id)
    }

    /// Glob matching every primary key of `kind`.
    pub fn primary_pattern(&self, kind: EntityKind) -> String {
        format!("{}:{}:*", self.schema_version, kind)
    }

    /// Extract the record id from a primary key of `kind`.
    pub fn id_from_primary<'a>(&self, kind: EntityKind, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(self.schema_version.as_str())?
            .strip_prefix(':')?
            .strip_prefix(kind.as_str())?
            .strip_prefix(':')
            .filter(|id| !id.is_empty())
    }

    pub fn tombstone(&self, kind: EntityKind, id: &str) -> String {
        format!("{TOMBSTONE_PREFIX}:{kind}:{id}")
    }

    pub fn index(&self, kind: EntityKind, field: &str, value: &str) -> String {
        format!("{}:{INDEX_SEGMENT}:{}:{}:{}", self.schema_version, kind, field, value)
    }
}

/// Match `key` against a backend glob where `*` is the only wildcard, which
/// is all the key patterns above use.
pub fn glob_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');
    let Some(first) = parts.next() else {
        return key.is_empty();
    };
    let Some(mut rest) = key.strip_prefix(first) else {
        return false;
    };
    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
