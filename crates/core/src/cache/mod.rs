//! Cache-aside layer over a key-value backend
//!
//! Reads consult the tombstone first, then the primary entry, then the
//! record store. Every write lands with a jittered TTL so entries written
//! together do not expire together.

pub mod counters;
pub mod entity_cache;
pub mod index;
pub mod keys;
pub mod ports;
pub mod tombstone;
pub mod ttl;

pub use counters::{CounterSnapshot, RequestCounters};
pub use entity_cache::EntityCache;
pub use index::SecondaryIndex;
pub use keys::{glob_matches, KeyLayout};
pub use tombstone::Tombstones;
