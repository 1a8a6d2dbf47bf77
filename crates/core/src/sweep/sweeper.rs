//! Reference-graph pruned reconciliation of cache against store
//!
//! One run:
//! 1. Ping the backend; abort before any mutation if it is unreachable.
//! 2. Enumerate cached ids of every kind (abort on any scan failure).
//! 3. Read cached payloads of kinds that declare relationships and build
//!    the [`ReferenceGraph`].
//! 4. For kinds with inbound references, verify only ids nobody
//!    references; for the others (votes, referrals) verify every id.
//! 5. Store not-found evicts and tombstones; present leaves the entry
//!    alone; any other error is logged and the entry is left as-is.
//!
//! Deletion only ever follows an authoritative not-found, so a reference
//! graph missing payloads can only cost extra verifications.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use recordcache_domain::{
    CacheConfig, EntityKind, KindSweepStats, Payload, Result, SweepReport,
};
use tracing::{debug, error, info, instrument, warn};

use super::reference_graph::ReferenceGraph;
use crate::cache::index::SecondaryIndex;
use crate::cache::keys::KeyLayout;
use crate::cache::ports::CacheBackend;
use crate::cache::tombstone::Tombstones;
use crate::store::ports::RecordStore;

/// Scheduled reconciliation job.
#[derive(Clone)]
pub struct ReconciliationSweeper {
    backend: Arc<dyn CacheBackend>,
    store: Arc<dyn RecordStore>,
    keys: KeyLayout,
    tombstones: Tombstones,
    index: SecondaryIndex,
}

impl ReconciliationSweeper {
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
        Ok(Self { backend, store, keys, tombstones, index })
    }

    /// Run one full sweep over every entity kind.
    ///
    /// # Errors
    /// `Backend` when the backend is unreachable or a key scan fails; no
    /// entry has been touched in that case. Per-record store failures are
    /// counted in the report instead.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SweepReport> {
        let started_at = Utc::now();

        if let Err(err) = self.backend.ping().await {
            error!(error = %err, "backend unreachable, aborting sweep");
            return Err(err);
        }

        let mut cached: BTreeMap<EntityKind, Vec<String>> = BTreeMap::new();
        for kind in EntityKind::ALL {
            let ids = self.cached_ids(kind).await.inspect_err(|err| {
                error!(%kind, error = %err, "key scan failed, aborting sweep");
            })?;
            cached.insert(kind, ids);
        }

        let mut graph = ReferenceGraph::new();
        for (kind, ids) in &cached {
            if kind.spec().relationships.is_empty() {
                continue;
            }
            for id in ids {
                if let Some(payload) = self.read_payload(*kind, id).await {
                    graph.add_payload(*kind, &payload);
                }
            }
        }

        let mut kinds = BTreeMap::new();
        for (kind, ids) in cached {
            let stats = self.reconcile_kind(kind, &ids, &graph).await;
            info!(
                %kind,
                cached = stats.cached,
                referenced = graph.referenced_count(kind),
                skipped = stats.skipped_referenced + stats.skipped_tombstoned,
                verified = stats.verified,
                removed = stats.removed,
                errors = stats.errors,
                "kind reconciled"
            );
            kinds.insert(kind, stats);
        }

        let report = SweepReport { started_at, finished_at: Utc::now(), kinds };
        info!(
            verified = report.total_verified(),
            removed = report.total_removed(),
            errors = report.total_errors(),
            "sweep finished"
        );
        Ok(report)
    }

    async fn reconcile_kind(
        &self,
        kind: EntityKind,
        ids: &[String],
        graph: &ReferenceGraph,
    ) -> KindSweepStats {
        let prune = kind.has_inbound_references();
        let mut stats = KindSweepStats { cached: ids.len(), ..Default::default() };

        for id in ids {
            if prune && graph.is_referenced(kind, id) {
                stats.skipped_referenced += 1;
                continue;
            }
            if self.tombstones.is_tombstoned(kind, id).await {
                stats.skipped_tombstoned += 1;
                continue;
            }

            stats.verified += 1;
            match self.store.get(kind, id).await {
                Ok(_) => {
                    stats.confirmed += 1;
                    debug!(%kind, id, "unreferenced record still present");
                }
                Err(err) if err.is_not_found() => {
                    self.evict(kind, id).await;
                    stats.removed += 1;
                }
                Err(err) => {
                    stats.errors += 1;
                    warn!(%kind, id, error = %err, "verification failed, leaving entry as-is");
                }
            }
        }
        stats
    }

    async fn evict(&self, kind: EntityKind, id: &str) {
        if !kind.spec().indexed_fields.is_empty() {
            if let Some(payload) = self.read_payload(kind, id).await {
                self.index.forget_payload(kind, &payload).await;
            }
        }
        self.backend.delete(&self.keys.primary(kind, id)).await;
        self.tombstones.bury(kind, id).await;
        info!(%kind, id, "evicted record deleted at source");
    }

    async fn cached_ids(&self, kind: EntityKind) -> Result<Vec<String>> {
        let keys = self.backend.scan_keys(&self.keys.primary_pattern(kind)).await?;
        let mut ids: Vec<String> = keys
            .iter()
            .filter_map(|key| self.keys.id_from_primary(kind, key))
            .map(str::to_string)
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn read_payload(&self, kind: EntityKind, id: &str) -> Option<Payload> {
        let raw = self.backend.get(&self.keys.primary(kind, id)).await?;
        serde_json::from_slice(&raw).ok()
    }
}
