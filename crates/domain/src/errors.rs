//! Error types used throughout the cache layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for RecordCache
///
/// Only a subset of these ever reaches callers of the entity cache:
/// `NotFound` is turned into an empty result, `Backend` and `Validation` are
/// absorbed as cache misses. Store-side failures (`Store`, `Network`,
/// `RateLimited`, `Auth`) propagate.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum RecordCacheError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Record store error: {0}")]
    Store(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Cache backend error: {0}")]
    Backend(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RecordCacheError {
    /// True when the store authoritatively reported the record as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// True for upstream failures that may succeed on a later attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::Network(_) | Self::Store(_) | Self::Backend(_))
    }
}

/// Result type alias for RecordCache operations
pub type Result<T> = std::result::Result<T, RecordCacheError>;
