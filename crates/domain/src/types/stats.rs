//! Statistics produced by the reconciliation sweep

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::entity::EntityKind;

/* -------------------------------------------------------------------------- */
/* Per-kind sweep statistics */
/* -------------------------------------------------------------------------- */

/// Outcome of one sweep pass over a single entity kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KindSweepStats {
    /// Ids found in the primary cache.
    pub cached: usize,

    /// Ids skipped because another cached record references them.
    pub skipped_referenced: usize,

    /// Ids skipped because a tombstone already covers them.
    pub skipped_tombstoned: usize,

    /// Existence checks issued against the record store.
    pub verified: usize,

    /// Verified ids the store still has (left untouched).
    pub confirmed: usize,

    /// Verified ids the store no longer has (evicted and tombstoned).
    pub removed: usize,

    /// Verifications that failed and were left as-is.
    pub errors: usize,
}

/* -------------------------------------------------------------------------- */
/* Whole-run report */
/* -------------------------------------------------------------------------- */

/// Summary of a complete sweep run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub kinds: BTreeMap<EntityKind, KindSweepStats>,
}

impl SweepReport {
    /// Total store calls issued by the run.
    pub fn total_verified(&self) -> usize {
        self.kinds.values().map(|stats| stats.verified).sum()
    }

    /// Total cache entries evicted by the run.
    pub fn total_removed(&self) -> usize {
        self.kinds.values().map(|stats| stats.removed).sum()
    }

    /// Total per-record verification failures.
    pub fn total_errors(&self) -> usize {
        self.kinds.values().map(|stats| stats.errors).sum()
    }

    /// Stats for one kind (zeroed when the kind was not swept).
    pub fn for_kind(&self, kind: EntityKind) -> KindSweepStats {
        self.kinds.get(&kind).copied().unwrap_or_default()
    }
}
