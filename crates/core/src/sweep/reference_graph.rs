//! Sweep-scoped set of ids referenced by cached records

use std::collections::{HashMap, HashSet};

use recordcache_domain::types::record::relationship_ids;
use recordcache_domain::{EntityKind, Payload};

/// For each target kind, the ids some cached record points at.
///
/// Rebuilt from scratch on every sweep run and never persisted.
#[derive(Debug, Clone, Default)]
pub struct ReferenceGraph {
    referenced: HashMap<EntityKind, HashSet<String>>,
}

impl ReferenceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record every relationship value `payload` carries, per the declared
    /// relationship fields of `kind`.
    pub fn add_payload(&mut self, kind: EntityKind, payload: &Payload) {
        for relationship in kind.spec().relationships {
            for id in relationship_ids(payload, relationship.field) {
                self.referenced.entry(relationship.target).or_default().insert(id.to_string());
            }
        }
    }

    pub fn is_referenced(&self, kind: EntityKind, id: &str) -> bool {
        self.referenced.get(&kind).is_some_and(|ids| ids.contains(id))
    }

    /// Number of distinct ids of `kind` referenced.
    pub fn referenced_count(&self, kind: EntityKind) -> usize {
        self.referenced.get(&kind).map_or(0, HashSet::len)
    }
}
