//! Record store port, filter formulas and the call-counting wrapper

pub mod formula;
pub mod instrumented;
pub mod ports;

pub use formula::Formula;
pub use instrumented::{InstrumentedRecordStore, StoreCallCounts};
pub use ports::{ListQuery, RecordStore};
