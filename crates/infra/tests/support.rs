//! Shared helpers for infra integration tests.

#![allow(dead_code)]

use std::time::Duration;

use recordcache_domain::StoreConfig;
use recordcache_infra::{HttpClient, HttpRecordStore};
use serde_json::{json, Value};
use wiremock::MockServer;

/// Path prefix every test store is rooted at.
pub const BASE_PATH: &str = "/v0/app";

/// Store configuration pointed at `server`, generous enough that the rate
/// limiter never slows a test down.
pub fn store_config(server: &MockServer) -> StoreConfig {
    StoreConfig {
        base_url: format!("{}{BASE_PATH}", server.uri()),
        api_token: Some("test-token".into()),
        timeout_secs: 5,
        max_attempts: 2,
        requests_per_second: 1000,
        page_size: 2,
        ..StoreConfig::default()
    }
}

/// Store client with near-zero retry backoff.
pub fn fast_store(config: &StoreConfig) -> HttpRecordStore {
    let http = HttpClient::builder()
        .timeout(config.timeout())
        .max_attempts(config.max_attempts)
        .base_backoff(Duration::from_millis(1))
        .build()
        .expect("http client builds");
    HttpRecordStore::with_client(config, http).expect("store client builds")
}

/// A record in the store's wire shape.
pub fn record_json(id: &str, fields: Value) -> Value {
    json!({ "id": id, "createdTime": "2024-05-01T12:00:00.000Z", "fields": fields })
}

/// One page of a list response.
pub fn page_json(records: Vec<Value>, offset: Option<&str>) -> Value {
    match offset {
        Some(offset) => json!({ "records": records, "offset": offset }),
        None => json!({ "records": records }),
    }
}

pub fn table_path(table: &str) -> String {
    format!("{BASE_PATH}/{table}")
}

pub fn record_path(table: &str, id: &str) -> String {
    format!("{BASE_PATH}/{table}/{id}")
}
