//! Per-request cache counters
//!
//! A `RequestCounters` value lives as long as one request and is passed by
//! reference into every cache call that request makes. There is no
//! process-wide counter, so concurrent requests never see each other's
//! numbers.
//!
//! ## Design
//! - **Relaxed ordering**: each counter is independent and only read after
//!   the request's cache calls have completed
//! - **Plain integers out**: [`CounterSnapshot`] is what the HTTP layer turns
//!   into response headers

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Hit/miss/bypass counters scoped to a single request.
#[derive(Debug, Default)]
pub struct RequestCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    bypasses: AtomicU64,
}

impl RequestCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Served from the cache (including tombstone short-circuits).
    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    /// Fell through to the record store.
    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Went straight to the record store without consulting the cache.
    pub fn record_bypass(&self) {
        self.bypasses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            bypasses: self.bypasses.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of a request's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub bypasses: u64,
}
