//! # RecordCache Core
//!
//! Pure cache logic - no infrastructure dependencies.
//!
//! This crate contains:
//! - Port interfaces for the key-value backend and the record store
//! - The cache-aside entity cache with tombstones and a secondary index
//! - The reference-graph reconciliation sweep
//! - The push-notification handler
//!
//! ## Architecture Principles
//! - Only depends on `recordcache-domain`
//! - No network, Redis or HTTP code
//! - All external dependencies via traits
//! - Handles are constructed explicitly and passed in; no globals

pub mod cache;
pub mod push;
pub mod store;
pub mod sweep;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export specific items to avoid ambiguity
pub use cache::ports::CacheBackend;
pub use cache::{CounterSnapshot, EntityCache, KeyLayout, RequestCounters, SecondaryIndex, Tombstones};
pub use push::{PushHandler, PushOutcome};
pub use store::ports::{ListQuery, RecordStore};
pub use store::{Formula, InstrumentedRecordStore, StoreCallCounts};
pub use sweep::{ReconciliationSweeper, ReferenceGraph};
