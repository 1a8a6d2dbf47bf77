//! # RecordCache Infrastructure
//!
//! Implementations of the `recordcache-core` ports plus process plumbing.
//!
//! This crate contains:
//! - Cache backends (Redis, in-memory)
//! - The HTTP record store client (rate limited, retrying)
//! - Sweep scheduling
//! - Configuration loading and logging setup
//!
//! ## Architecture
//! - Implements traits defined in `recordcache-core`
//! - Contains all "impure" code (network, timers, filesystem)

pub mod backend;
pub mod config;
pub mod errors;
pub mod http;
pub mod logging;
pub mod scheduling;
pub mod store;

pub use backend::{MemoryCacheBackend, RedisCacheBackend};
pub use errors::InfraError;
pub use http::HttpClient;
pub use scheduling::{SchedulerError, SweepJob, SweepScheduler, SweepSchedulerConfig};
pub use store::HttpRecordStore;
