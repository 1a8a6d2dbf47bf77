//! # RecordCache Domain
//!
//! Business domain types for the record cache layer.
//!
//! This crate contains:
//! - Entity kinds and their static relationship/index declarations
//! - Record and payload types exchanged with the record store
//! - Domain error types and Result definitions
//! - Configuration structures
//! - Domain constants (key prefixes, TTL defaults)
//!
//! ## Architecture
//! - No dependencies on other RecordCache crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
