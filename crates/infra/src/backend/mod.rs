//! Cache backend implementations
//!
//! - [`RedisCacheBackend`]: the shared remote backend used in production
//! - [`MemoryCacheBackend`]: moka-backed, process-local; for single-node
//!   deployments and local development

pub mod memory;
pub mod redis;

pub use memory::MemoryCacheBackend;
pub use redis::RedisCacheBackend;
