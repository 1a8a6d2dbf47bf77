//! REST client for the remote record store
//!
//! Tables live under `{base_url}/{table}`. Listing is paginated through an
//! opaque `offset` token; filters are sent as `filterByFormula`. Every HTTP
//! request (each page included) first waits on a client-side rate limiter
//! so the store's per-second quota is never exceeded by this process.

use std::num::NonZeroU32;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use recordcache_core::{ListQuery, RecordStore};
use recordcache_domain::{EntityKind, Payload, Record, RecordCacheError, Result, StoreConfig};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument, warn};

use crate::errors::InfraError;
use crate::http::HttpClient;

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

#[derive(Debug, Deserialize)]
struct ListPage {
    #[serde(default)]
    records: Vec<Record>,
    #[serde(default)]
    offset: Option<String>,
}

/// [`RecordStore`] over the store's REST API.
pub struct HttpRecordStore {
    http: HttpClient,
    base_url: Url,
    config: StoreConfig,
    limiter: DirectRateLimiter,
}

impl HttpRecordStore {
    /// Build a client from configuration.
    ///
    /// # Errors
    /// `Config` for an unusable base URL or API token.
    pub fn new(config: &StoreConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(token) = &config.api_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| RecordCacheError::Config("store.api_token is not a valid header".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = HttpClient::builder()
            .timeout(config.timeout())
            .max_attempts(config.max_attempts)
            .user_agent(concat!("recordcache/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .build()?;

        Self::with_client(config, http)
    }

    /// Build around an existing HTTP client.
    ///
    /// # Errors
    /// `Config` for an unusable base URL.
    pub fn with_client(config: &StoreConfig, http: HttpClient) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|err| {
            RecordCacheError::Config(format!("invalid store.base_url {}: {err}", config.base_url))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(RecordCacheError::Config(format!(
                "store.base_url {} cannot carry a path",
                config.base_url
            )));
        }

        let rate = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let limiter = RateLimiter::direct(Quota::per_second(rate));

        Ok(Self { http, base_url, config: config.clone(), limiter })
    }

    fn url(&self, kind: EntityKind, id: Option<&str>) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|()| {
                RecordCacheError::Config("store.base_url cannot carry a path".into())
            })?;
            segments.pop_if_empty().push(self.config.table_for(kind));
            if let Some(id) = id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    async fn execute(&self, method: Method, url: Url, body: Option<Value>) -> Result<Response> {
        self.limiter.until_ready().await;
        let mut request = self.http.request(method, url);
        if let Some(body) = body {
            request = request.json(&body);
        }
        self.http.send(request).await
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T> {
        response.json::<T>().await.map_err(|err| InfraError::from(err).into())
    }
}

/// Error codes the store answers with when the record itself is absent.
/// Any other 404 (missing table, wrong base path, proxy page) says nothing
/// about the record and must not be read as a deletion.
const RECORD_NOT_FOUND_CODES: [&str; 2] = ["NOT_FOUND", "MODEL_ID_NOT_FOUND"];

const TABLE_NOT_FOUND_CODE: &str = "TABLE_NOT_FOUND";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorCode,
}

/// The store reports errors either as a bare code or as `{ "type": .. }`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ErrorCode {
    Code(String),
    Detailed {
        #[serde(rename = "type")]
        code: String,
    },
}

impl ErrorCode {
    fn as_str(&self) -> &str {
        match self {
            Self::Code(code) | Self::Detailed { code } => code,
        }
    }
}

fn error_code(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<ErrorBody>(body).ok().map(|body| body.error.as_str().to_string())
}

/// Map a 404 body to a domain error.
///
/// Only a record-level code is `NotFound`; a missing table is `Config`;
/// anything else is an unexplained `Store` failure.
fn classify_not_found(body: &[u8], resource: &str) -> RecordCacheError {
    match error_code(body) {
        Some(code) if RECORD_NOT_FOUND_CODES.contains(&code.as_str()) => {
            RecordCacheError::NotFound(resource.to_string())
        }
        Some(code) if code == TABLE_NOT_FOUND_CODE => {
            RecordCacheError::Config(format!("table for {resource} does not exist"))
        }
        Some(code) => RecordCacheError::Store(format!("404 {code} for {resource}")),
        None => RecordCacheError::Store(format!("404 without an error code for {resource}")),
    }
}

/// Map a non-success status to a domain error, naming `resource` on 404.
async fn check_status(response: Response, resource: &str) -> Result<Response> {
    if response.status() != StatusCode::NOT_FOUND {
        return response.error_for_status().map_err(|err| InfraError::from(err).into());
    }
    let body = response.bytes().await.map_err(InfraError::from)?;
    let err = classify_not_found(&body, resource);
    if !err.is_not_found() {
        warn!(resource, error = %err, "store answered 404 without naming the record");
    }
    Err(err)
}

fn fields_body(fields: Payload) -> Value {
    json!({ "fields": fields })
}

#[async_trait]
impl RecordStore for HttpRecordStore {
    #[instrument(skip(self), fields(kind = %kind))]
    async fn get(&self, kind: EntityKind, id: &str) -> Result<Record> {
        let url = self.url(kind, Some(id))?;
        let response = self.execute(Method::GET, url, None).await?;
        let response = check_status(response, &format!("{kind}/{id}")).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self, query), fields(kind = %kind))]
    async fn list(&self, kind: EntityKind, query: &ListQuery) -> Result<Vec<Record>> {
        let mut records = Vec::new();
        let mut offset: Option<String> = None;
        let mut pages = 0usize;

        loop {
            let mut url = self.url(kind, None)?;
            {
                let mut pairs = url.query_pairs_mut();
                pairs.append_pair("pageSize", &self.config.page_size.to_string());
                if let Some(filter) = &query.filter {
                    pairs.append_pair("filterByFormula", &filter.render());
                }
                if let Some(max) = query.max_records {
                    pairs.append_pair("maxRecords", &max.to_string());
                }
                if let Some(offset) = &offset {
                    pairs.append_pair("offset", offset);
                }
            }

            let response = self.execute(Method::GET, url, None).await?;
            if response.status() == StatusCode::NOT_FOUND {
                return Err(RecordCacheError::Config(format!(
                    "table {} for {kind} does not exist",
                    self.config.table_for(kind)
                )));
            }
            let response = check_status(response, kind.as_str()).await?;
            let page: ListPage = Self::decode(response).await?;
            pages += 1;
            records.extend(page.records);

            if let Some(max) = query.max_records {
                if records.len() >= max {
                    records.truncate(max);
                    break;
                }
            }
            match page.offset {
                Some(next) if !next.is_empty() => offset = Some(next),
                _ => break,
            }
        }

        debug!(%kind, pages, count = records.len(), "listed records");
        Ok(records)
    }

    #[instrument(skip(self, fields), fields(kind = %kind))]
    async fn create(&self, kind: EntityKind, fields: Payload) -> Result<Record> {
        let url = self.url(kind, None)?;
        let response = self.execute(Method::POST, url, Some(fields_body(fields))).await?;
        let response = check_status(response, kind.as_str()).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self, fields), fields(kind = %kind))]
    async fn update(&self, kind: EntityKind, id: &str, fields: Payload) -> Result<Record> {
        let url = self.url(kind, Some(id))?;
        let response = self.execute(Method::PATCH, url, Some(fields_body(fields))).await?;
        let response = check_status(response, &format!("{kind}/{id}")).await?;
        Self::decode(response).await
    }

    #[instrument(skip(self), fields(kind = %kind))]
    async fn delete(&self, kind: EntityKind, id: &str) -> Result<()> {
        let url = self.url(kind, Some(id))?;
        let response = self.execute(Method::DELETE, url, None).await?;
        check_status(response, &format!("{kind}/{id}")).await?;
        Ok(())
    }
}
