//! HTTP client shared by remote integrations

pub mod client;

pub use client::{HttpClient, HttpClientBuilder};
