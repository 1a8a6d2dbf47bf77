//! Entity kinds and their static declarations
//!
//! Every kind the record store exposes is declared here once: which payload
//! fields hold references to other records, and which fields carry a
//! secondary index. The reconciliation sweep and the secondary index read
//! these tables instead of guessing field names at runtime.

use serde::{Deserialize, Serialize};

use crate::impl_domain_enum_conversions;

/// The five entity kinds held by the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Events,
    Projects,
    Users,
    Votes,
    Referrals,
}

impl_domain_enum_conversions!(EntityKind {
    Events => "events",
    Projects => "projects",
    Users => "users",
    Votes => "votes",
    Referrals => "referrals",
});

/// A payload field that holds the id (or ids) of records of another kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Relationship {
    /// Payload field name.
    pub field: &'static str,
    /// Kind of the referenced records.
    pub target: EntityKind,
}

/// Static configuration record for one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySpec {
    pub kind: EntityKind,
    pub relationships: &'static [Relationship],
    pub indexed_fields: &'static [&'static str],
}

const fn rel(field: &'static str, target: EntityKind) -> Relationship {
    Relationship { field, target }
}

static EVENTS: EntitySpec = EntitySpec {
    kind: EntityKind::Events,
    relationships: &[rel("owner", EntityKind::Users), rel("attendees", EntityKind::Users)],
    indexed_fields: &[],
};

static PROJECTS: EntitySpec = EntitySpec {
    kind: EntityKind::Projects,
    relationships: &[
        rel("owner", EntityKind::Users),
        rel("event", EntityKind::Events),
        rel("collaborators", EntityKind::Users),
    ],
    indexed_fields: &[],
};

static USERS: EntitySpec =
    EntitySpec { kind: EntityKind::Users, relationships: &[], indexed_fields: &["email"] };

static VOTES: EntitySpec = EntitySpec {
    kind: EntityKind::Votes,
    relationships: &[
        rel("voter", EntityKind::Users),
        rel("project", EntityKind::Projects),
        rel("event", EntityKind::Events),
    ],
    indexed_fields: &[],
};

static REFERRALS: EntitySpec = EntitySpec {
    kind: EntityKind::Referrals,
    relationships: &[
        rel("referrer", EntityKind::Users),
        rel("referred_user", EntityKind::Users),
        rel("event", EntityKind::Events),
    ],
    indexed_fields: &[],
};

impl EntityKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] =
        [Self::Events, Self::Projects, Self::Users, Self::Votes, Self::Referrals];

    /// Static declaration for this kind.
    pub fn spec(self) -> &'static EntitySpec {
        match self {
            Self::Events => &EVENTS,
            Self::Projects => &PROJECTS,
            Self::Users => &USERS,
            Self::Votes => &VOTES,
            Self::Referrals => &REFERRALS,
        }
    }

    /// True when at least one declared relationship of any kind points here.
    ///
    /// Kinds without inbound references cannot be pruned by the reference
    /// graph and are verified id by id during a sweep.
    pub fn has_inbound_references(self) -> bool {
        Self::ALL
            .iter()
            .any(|kind| kind.spec().relationships.iter().any(|r| r.target == self))
    }
}

impl EntitySpec {
    /// Whether `field` carries a secondary index for this kind.
    pub fn is_indexed(&self, field: &str) -> bool {
        self.indexed_fields.contains(&field)
    }
}
