//! HTTP client and response classification.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use orchestration::{BoundaryClient, CallArgs, RawRecord, RemoteCallError, RemoteMethod};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode, Url};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::endpoints::{function_table, Endpoint, Verb};
use crate::GithubError;

/// Public GitHub API root.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Records requested per page when listing.
pub const PAGE_SIZE: usize = 100;

const API_VERSION: &str = "2022-11-28";

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Connection settings for [`GithubClient`].
#[derive(Clone)]
pub struct GithubConfig {
    /// API root, e.g. `https://api.github.com` or a GitHub Enterprise
    /// `https://ghe.example.com/api/v3`.
    pub api_url: String,
    /// Personal access or installation token, sent as a bearer token.
    pub token: String,
    /// `User-Agent` header value; GitHub rejects requests without one.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl GithubConfig {
    /// Settings for the public API with default user agent and timeout.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            token: token.into(),
            user_agent: concat!("ghbackup/", env!("CARGO_PKG_VERSION")).to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    #[must_use]
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = api_url.into();
        self
    }
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field("timeout", &self.timeout)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Boundary client over the GitHub REST API.
///
/// Listings follow `page` / `per_page` pagination until a page comes back
/// shorter than [`PAGE_SIZE`] and return one concatenated JSON array. Writes
/// return the created or updated record as GitHub sends it.
pub struct GithubClient {
    http: Client,
    base: String,
    table: BTreeMap<&'static str, Endpoint>,
}

impl GithubClient {
    /// Builds a client.
    ///
    /// # Errors
    ///
    /// Fails when the base URL does not parse, the token is not a valid
    /// header value, or the TLS backend cannot be initialised.
    pub fn new(config: &GithubConfig) -> Result<Self, GithubError> {
        Url::parse(&config.api_url).map_err(|e| GithubError::InvalidBaseUrl {
            url: config.api_url.clone(),
            message: e.to_string(),
        })?;

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| GithubError::InvalidToken)?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            HeaderValue::from_static(API_VERSION),
        );

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout)
            .build()
            .map_err(|source| GithubError::Client { source })?;

        Ok(Self {
            http,
            base: config.api_url.trim_end_matches('/').to_string(),
            table: function_table(),
        })
    }

    /// Names of every supported remote method.
    pub fn methods(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.keys().copied()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    #[instrument(level = "debug", skip_all, fields(method = %method))]
    async fn dispatch(
        &self,
        method: &str,
        endpoint: &Endpoint,
        args: &CallArgs,
    ) -> Result<RawRecord, RemoteCallError> {
        let path = endpoint.render_path(method, args)?;
        match endpoint.verb {
            Verb::List => self.list(method, &path, endpoint.query(args)).await,
            Verb::Create => {
                let request = self.http.post(self.url(&path)).json(&endpoint.body(args));
                self.send(method, request).await
            }
            Verb::Update => {
                let request = self.http.patch(self.url(&path)).json(&endpoint.body(args));
                self.send(method, request).await
            }
        }
    }

    async fn list(
        &self,
        method: &str,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<RawRecord, RemoteCallError> {
        let mut items = Vec::new();
        for page in 1u32.. {
            let request = self
                .http
                .get(self.url(path))
                .query(&query)
                .query(&[("per_page", PAGE_SIZE.to_string()), ("page", page.to_string())]);
            let Value::Array(batch) = self.send(method, request).await? else {
                return Err(RemoteCallError::non_retryable(
                    method,
                    "expected a JSON array from a listing",
                ));
            };
            let len = batch.len();
            items.extend(batch);
            if len < PAGE_SIZE {
                debug!(pages = page, count = items.len(), "listing complete");
                break;
            }
        }
        Ok(Value::Array(items))
    }

    async fn send(&self, method: &str, request: RequestBuilder) -> Result<Value, RemoteCallError> {
        let response = request
            .send()
            .await
            .map_err(|e| transport_error(method, &e))?;
        let status = response.status();
        debug!(status = status.as_u16(), "response received");

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(classify(method, status, &headers, &body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(method, &e))?;
        if bytes.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&bytes).map_err(|e| {
            RemoteCallError::non_retryable(method, format!("invalid JSON response: {e}"))
                .with_status(status.as_u16())
        })
    }
}

impl std::fmt::Debug for GithubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubClient")
            .field("base", &self.base)
            .field("methods", &self.table.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl BoundaryClient for GithubClient {
    fn supports(&self, method: &RemoteMethod) -> bool {
        self.table.contains_key(method.as_str())
    }

    async fn call(
        &self,
        method: &RemoteMethod,
        args: &CallArgs,
    ) -> Result<RawRecord, RemoteCallError> {
        let Some(endpoint) = self.table.get(method.as_str()) else {
            return Err(RemoteCallError::non_retryable(
                method.as_str(),
                "unsupported remote method",
            ));
        };
        self.dispatch(method.as_str(), endpoint, args).await
    }
}

// ---------------------------------------------------------------------------
// Failure classification
// ---------------------------------------------------------------------------

fn transport_error(method: &str, error: &reqwest::Error) -> RemoteCallError {
    if error.is_builder() {
        RemoteCallError::non_retryable(method, error.to_string())
    } else {
        RemoteCallError::retryable(method, error.to_string())
    }
}

/// Maps a non-success response onto a retry decision.
///
/// Throttling (429, or 403 with the rate limit exhausted) and server errors
/// may be retried; every other status is permanent.
fn classify(method: &str, status: StatusCode, headers: &HeaderMap, body: &str) -> RemoteCallError {
    let reason = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("message")?.as_str().map(str::to_string))
        .unwrap_or_else(|| status.canonical_reason().unwrap_or("request failed").to_string());
    let message = format!("HTTP {}: {reason}", status.as_u16());

    let throttled = status == StatusCode::TOO_MANY_REQUESTS
        || (status == StatusCode::FORBIDDEN && rate_limit_exhausted(headers));
    let error = if throttled {
        let delay = retry_delay(headers);
        warn!(
            method,
            status = status.as_u16(),
            retry_after_secs = delay.map(|d| d.as_secs()),
            "rate limited"
        );
        let error = RemoteCallError::retryable(method, message);
        match delay {
            Some(delay) => error.with_retry_after(delay),
            None => error,
        }
    } else if status.is_server_error() {
        RemoteCallError::retryable(method, message)
    } else {
        RemoteCallError::non_retryable(method, message)
    };
    error.with_status(status.as_u16())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name)?.to_str().ok().map(str::trim)
}

fn rate_limit_exhausted(headers: &HeaderMap) -> bool {
    header_str(headers, "x-ratelimit-remaining") == Some("0") || headers.contains_key(RETRY_AFTER)
}

/// Server-requested delay from `Retry-After` (seconds) or, failing that, the
/// `x-ratelimit-reset` epoch.
fn retry_delay(headers: &HeaderMap) -> Option<Duration> {
    if let Some(secs) = header_str(headers, RETRY_AFTER.as_str()).and_then(|v| v.parse().ok()) {
        return Some(Duration::from_secs(secs));
    }
    let reset: i64 = header_str(headers, "x-ratelimit-reset")?.parse().ok()?;
    let wait = reset.saturating_sub(chrono::Utc::now().timestamp()).max(0);
    Some(Duration::from_secs(wait.unsigned_abs()))
}
