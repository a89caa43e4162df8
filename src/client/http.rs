//! Stripe HTTP client
//!
//! Provides one client for every API interaction with:
//! - Basic authentication (API key as username, empty password)
//! - Rate limit integration
//! - Retry logic with exponential backoff for 429, 5xx and network errors
//! - JSON and form request helpers plus raw downloads for report files

use bytes::Bytes;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::backoff::{
    calculate_backoff_from, CONNECT_TIMEOUT_SECS, DEFAULT_MAX_RETRIES,
    DEFAULT_REQUEST_TIMEOUT_SECS, INITIAL_BACKOFF_MS,
};
use super::classify::{classify_error, format_failure, format_retry, RetryErrorType};
use super::rate_limit::RateLimiter;
use super::{ClientError, ClientResult};
use crate::config::ApiKey;
use crate::metrics::{record_retry_backoff, HttpRequestMetrics};

/// Default API root
pub const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

/// Default outbound requests per second
pub const DEFAULT_REQUESTS_PER_SECOND: u32 = 25;

/// Longest error body kept in [`ClientError::Http`]
const MAX_ERROR_BODY: usize = 512;

/// Settings used to build an [`ApiClient`]
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// API root, e.g. `https://api.stripe.com/v1`
    pub base_url: String,
    /// Secret API key
    pub api_key: ApiKey,
    /// Overall request timeout
    pub request_timeout: Duration,
    /// Transport retries after the first attempt
    pub max_retries: u32,
    /// Outbound request budget per second
    pub requests_per_second: u32,
    /// First transport backoff delay (doubles per retry)
    pub initial_backoff: Duration,
}

impl ClientSettings {
    /// Settings with defaults for everything but the key
    pub fn new(api_key: ApiKey) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
            requests_per_second: DEFAULT_REQUESTS_PER_SECOND,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }

    /// Override the API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Override the transport retry count
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Override the first transport backoff delay
    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }
}

/// Authenticated client for all Stripe API interactions
pub struct ApiClient {
    client: Client,
    base_url: String,
    api_key: ApiKey,
    rate_limiter: Arc<RateLimiter>,
    max_retries: u32,
    initial_backoff: Duration,
}

impl ApiClient {
    /// Build a client with its own rate limiter
    pub fn new(settings: ClientSettings) -> ClientResult<Self> {
        let rate_limiter = Arc::new(RateLimiter::per_second(settings.requests_per_second));
        Self::with_rate_limiter(settings, rate_limiter)
    }

    /// Build a client that shares an existing rate limiter
    pub fn with_rate_limiter(
        settings: ClientSettings,
        rate_limiter: Arc<RateLimiter>,
    ) -> ClientResult<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(settings.request_timeout)
            .user_agent(concat!("tap-stripe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key,
            rate_limiter,
            max_retries: settings.max_retries,
            initial_backoff: settings.initial_backoff,
        })
    }

    /// API root without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Transport retries after the first attempt
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Absolute URL for an endpoint path
    pub fn url_for(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// GET an endpoint and deserialize the JSON body
    pub async fn get_json<T>(&self, endpoint: &str, params: &[(&str, String)]) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        self.get_json_labeled(endpoint, endpoint, params).await
    }

    /// GET with an explicit metrics label, for paths that embed object ids
    pub async fn get_json_labeled<T>(
        &self,
        label: &str,
        endpoint: &str,
        params: &[(&str, String)],
    ) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url_for(endpoint);
        debug!("GET {} with {} params", url, params.len());
        let response = self
            .execute(Method::GET, label, || self.client.get(&url).query(params))
            .await?;
        Self::decode_json(response).await
    }

    /// POST a form-encoded body and deserialize the JSON response
    ///
    /// Only 429 responses are retried; any other failure is returned
    /// immediately so a create call never runs twice.
    pub async fn post_form<T>(&self, endpoint: &str, form: &[(&str, String)]) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let url = self.url_for(endpoint);
        debug!("POST {} with {} fields", url, form.len());
        let response = self
            .execute(Method::POST, endpoint, || self.client.post(&url).form(form))
            .await?;
        Self::decode_json(response).await
    }

    /// Download an absolute URL (report result files)
    pub async fn download(&self, url: &str) -> ClientResult<Bytes> {
        debug!("Downloading {}", url);
        let response = self
            .execute(Method::GET, "report_file", || self.client.get(url))
            .await?;
        response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(format!("failed to read body: {e}")))
    }

    /// Send a request with authentication, rate limiting and retries
    ///
    /// Retries on:
    /// - Network errors and timeouts (GET only)
    /// - 5xx server errors (GET only)
    /// - 429 rate limit errors
    ///
    /// Does not retry on other 4xx client errors.
    async fn execute<F>(&self, method: Method, label: &str, build: F) -> ClientResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_attempts = self.max_retries + 1;
        let mut attempt: u32 = 0;

        loop {
            self.rate_limiter
                .acquire()
                .await
                .map_err(|e| ClientError::Network(format!("rate limiter error: {e}")))?;

            let request_metrics = HttpRequestMetrics::start(label, attempt + 1);
            let request = build().basic_auth(self.api_key.expose(), Some(""));

            let err = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    request_metrics.record_complete(status.as_u16());
                    if status.is_success() {
                        debug!("{} {} succeeded on attempt {}", method, label, attempt + 1);
                        return Ok(response);
                    }
                    if status.as_u16() == 429 {
                        ClientError::RateLimited
                    } else {
                        let body = response.text().await.unwrap_or_default();
                        ClientError::Http {
                            status: status.as_u16(),
                            body: truncate_body(body),
                        }
                    }
                }
                Err(e) => {
                    request_metrics.record_network_error();
                    transport_error(e)
                }
            };

            let error_type = classify_error(&err);
            let retryable = error_type.is_retryable()
                && (method == Method::GET || error_type == RetryErrorType::RateLimit);

            if !retryable || attempt >= self.max_retries {
                if attempt > 0 {
                    warn!("{}", format_failure(attempt + 1, &err, label));
                }
                return Err(err);
            }

            let backoff = calculate_backoff_from(self.initial_backoff, attempt);
            warn!(
                "{}",
                format_retry(attempt + 1, max_attempts, error_type, backoff, label)
            );
            record_retry_backoff(backoff, attempt + 1);
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }

    async fn decode_json<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
        let body = response
            .bytes()
            .await
            .map_err(|e| ClientError::Network(format!("failed to read body: {e}")))?;
        serde_json::from_slice(&body)
            .map_err(|e| ClientError::Parse(format!("failed to deserialize response: {e}")))
    }
}

fn transport_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout(e.to_string())
    } else {
        ClientError::Network(e.to_string())
    }
}

fn truncate_body(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
        body.push_str("...");
    }
    body
}
