//! Reconciliation sweep
//!
//! Detects cache entries whose source record was deleted out-of-band while
//! keeping calls to the rate-limited store low: any id referenced by another
//! cached record is assumed live and never verified.

pub mod reference_graph;
pub mod sweeper;

pub use reference_graph::ReferenceGraph;
pub use sweeper::ReconciliationSweeper;
