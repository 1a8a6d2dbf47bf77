use std::time::Duration;

use recordcache_domain::RecordCacheError;
use reqwest::header::RETRY_AFTER;
use reqwest::{Client as ReqwestClient, Method, RequestBuilder, Response, StatusCode};
use tracing::{debug, warn};

use crate::errors::InfraError;

/// Upper bound on a server-requested `Retry-After` wait.
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// HTTP client with built-in retry and timeout support.
///
/// Server errors and `429 Too Many Requests` are retried with exponential
/// backoff (or the server's `Retry-After`, when given) until the attempt
/// budget is spent; the last response is then returned to the caller.
#[derive(Clone)]
pub struct HttpClient {
    client: ReqwestClient,
    max_attempts: usize,
    base_backoff: Duration,
}

impl HttpClient {
    /// Start building a new HTTP client.
    pub fn builder() -> HttpClientBuilder {
        HttpClientBuilder::default()
    }

    /// Convenience constructor with default configuration.
    pub fn new() -> Result<Self, RecordCacheError> {
        Self::builder().build()
    }

    /// Create a request builder using the underlying reqwest client.
    pub fn request<U>(&self, method: Method, url: U) -> RequestBuilder
    where
        U: reqwest::IntoUrl,
    {
        self.client.request(method, url)
    }

    /// Execute the provided request builder with retry semantics.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response, RecordCacheError> {
        let attempts = self.max_attempts.max(1);

        for attempt in 0..attempts {
            let cloned_builder = builder.try_clone().ok_or_else(|| {
                RecordCacheError::Internal(
                    "request body cannot be cloned; buffer the body to enable retries".into(),
                )
            })?;

            let request = cloned_builder.build().map_err(|err| {
                let infra: InfraError = err.into();
                RecordCacheError::from(infra)
            })?;

            let method = request.method().clone();
            let url = request.url().clone();
            debug!(attempt = attempt + 1, %method, %url, "sending HTTP request");

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    debug!(attempt = attempt + 1, %method, %url, %status, "received HTTP response");

                    let retryable =
                        status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS;
                    if retryable && attempt + 1 < attempts {
                        let delay = retry_after(&response)
                            .unwrap_or_else(|| self.backoff_delay(attempt + 1));
                        if status == StatusCode::TOO_MANY_REQUESTS {
                            warn!(%url, delay_ms = delay.as_millis() as u64, "rate limited by store");
                        }
                        sleep(delay).await;
                        continue;
                    }

                    return Ok(response);
                }
                Err(err) => {
                    debug!(attempt = attempt + 1, %method, %url, error = %err, "HTTP request failed");

                    if attempt + 1 < attempts && should_retry_error(&err) {
                        sleep(self.backoff_delay(attempt + 1)).await;
                        continue;
                    }

                    let infra: InfraError = err.into();
                    return Err(RecordCacheError::from(infra));
                }
            }
        }

        Err(RecordCacheError::Internal(
            "http client exhausted retries without producing a result".into(),
        ))
    }

    fn backoff_delay(&self, retry_number: usize) -> Duration {
        let shift = retry_number.saturating_sub(1).min(8) as u32;
        let multiplier = 1u32 << shift;
        self.base_backoff.saturating_mul(multiplier)
    }
}

async fn sleep(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

/// `Retry-After` in whole seconds, capped.
fn retry_after(response: &Response) -> Option<Duration> {
    let secs = response.headers().get(RETRY_AFTER)?.to_str().ok()?.trim().parse::<u64>().ok()?;
    Some(Duration::from_secs(secs).min(MAX_RETRY_AFTER))
}

/// Builder for [`HttpClient`].
#[derive(Debug)]
pub struct HttpClientBuilder {
    timeout: Duration,
    max_attempts: usize,
    base_backoff: Duration,
    user_agent: Option<String>,
    default_headers: Option<reqwest::header::HeaderMap>,
}

impl Default for HttpClientBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
            user_agent: None,
            default_headers: None,
        }
    }
}

impl HttpClientBuilder {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Configure the total number of attempts (initial try + retries).
    pub fn max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn base_backoff(mut self, backoff: Duration) -> Self {
        self.base_backoff = backoff;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    pub fn default_headers(mut self, headers: reqwest::header::HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> Result<HttpClient, RecordCacheError> {
        let mut builder = ReqwestClient::builder().timeout(self.timeout).no_proxy();

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        if let Some(headers) = self.default_headers {
            builder = builder.default_headers(headers);
        }

        let client = builder.build().map_err(|err| {
            let infra: InfraError = err.into();
            RecordCacheError::from(infra)
        })?;

        Ok(HttpClient {
            client,
            max_attempts: self.max_attempts.max(1),
            base_backoff: self.base_backoff,
        })
    }
}

fn should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_request() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use reqwest::{Method, StatusCode};
    use serde_json::{json, Value};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const RECORD_PATH: &str = "/v0/app1/Users/usr1";

    fn store_client(attempts: usize) -> HttpClient {
        HttpClient::builder()
            .base_backoff(Duration::from_millis(5))
            .max_attempts(attempts)
            .build()
            .expect("http client")
    }

    fn record_body() -> Value {
        json!({ "id": "usr1", "fields": { "name": "Ada" } })
    }

    /// Responds with `failure` for the first `failures` calls, then with the record.
    fn flaky(
        failures: usize,
        failure: ResponseTemplate,
        calls: Arc<AtomicUsize>,
    ) -> impl Fn(&wiremock::Request) -> ResponseTemplate + Send + Sync + 'static {
        move |_req: &wiremock::Request| {
            if calls.fetch_add(1, Ordering::SeqCst) < failures {
                failure.clone()
            } else {
                ResponseTemplate::new(200).set_body_json(record_body())
            }
        }
    }

    #[tokio::test]
    async fn record_read_survives_a_store_outage() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .respond_with(flaky(2, ResponseTemplate::new(503), calls.clone()))
            .expect(3)
            .mount(&server)
            .await;

        let client = store_client(3);
        let url = format!("{}{RECORD_PATH}", server.uri());
        let response = client.send(client.request(Method::GET, url)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = response.json().await.expect("record json");
        assert_eq!(body["id"], "usr1");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn buffered_json_write_is_replayed_intact() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let payload = json!({ "fields": { "name": "Ada" } });
        Mock::given(method("POST"))
            .and(path("/v0/app1/Users"))
            .and(body_json(&payload))
            .respond_with(flaky(1, ResponseTemplate::new(502), calls.clone()))
            .expect(2)
            .mount(&server)
            .await;

        let client = store_client(3);
        let url = format!("{}/v0/app1/Users", server.uri());
        let response =
            client.send(client.request(Method::POST, url).json(&payload)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn throttled_read_waits_for_retry_after() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let throttled = ResponseTemplate::new(429).insert_header("Retry-After", "0");
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .respond_with(flaky(1, throttled, calls.clone()))
            .expect(2)
            .mount(&server)
            .await;

        let client = store_client(3);
        let url = format!("{}{RECORD_PATH}", server.uri());
        let response = client.send(client.request(Method::GET, url)).await.expect("response");

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn spent_budget_hands_back_the_throttle_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0"))
            .expect(2)
            .mount(&server)
            .await;

        let client = store_client(2);
        let url = format!("{}{RECORD_PATH}", server.uri());
        let response = client.send(client.request(Method::GET, url)).await.expect("response");

        // The store adapter maps this to `RateLimited`, so the header must survive.
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(RETRY_AFTER));
    }

    #[tokio::test]
    async fn missing_record_is_asked_about_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(RECORD_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "error": "NOT_FOUND" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = store_client(3);
        let url = format!("{}{RECORD_PATH}", server.uri());
        let response = client.send(client.request(Method::GET, url)).await.expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body: Value = response.json().await.expect("error json");
        assert_eq!(body["error"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn unreachable_store_is_a_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = store_client(2);
        let url = format!("http://{addr}{RECORD_PATH}");
        let result = client.send(client.request(Method::GET, url)).await;

        assert!(matches!(result, Err(RecordCacheError::Network(_))), "got {result:?}");
    }

    #[test]
    fn backoff_doubles_per_retry_and_saturates() {
        let client = store_client(3);

        assert_eq!(client.backoff_delay(1), Duration::from_millis(5));
        assert_eq!(client.backoff_delay(2), Duration::from_millis(10));
        assert_eq!(client.backoff_delay(3), Duration::from_millis(20));
        assert_eq!(client.backoff_delay(50), Duration::from_millis(5 * 256));
    }
}
