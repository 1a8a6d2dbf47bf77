//! Record store clients

pub mod http_store;

pub use http_store::HttpRecordStore;
