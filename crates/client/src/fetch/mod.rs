//! HTTP transport behind the `Fetcher` trait.
//!
//! ### URL Canonicalization
//! - Trim whitespace, ensure scheme (default: `https`)
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Transport
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//! - Conditional requests: `If-None-Match` for entity tags, `If-Modified-Since` otherwise
//! - Retries transport errors, 429 and 5xx with exponential backoff
//!
//! Non-success statuses are returned, not raised: callers decide what a 304 or
//! a 404 means for them.

pub mod retry;
pub mod url;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, header};
use std::collections::HashMap;
use std::time::{Duration, Instant};

pub use retry::RetryPolicy;
pub use url::{UrlError, canonicalize, origin_key, robots_path, robots_url};

use ::url::Url;
use kindly_core::Error;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "kindly/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout used when a call does not set its own (default: 20s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,

    /// Retry behavior for transient failures
    pub retry: RetryPolicy,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "kindly/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_millis(20000),
            max_redirects: 5,
            retry: RetryPolicy::default(),
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    /// Revalidation token from a previous response; makes the request conditional.
    pub validator: Option<String>,
    /// Overrides the client timeout for this call.
    pub timeout: Option<Duration>,
}

/// Raw response handed back by a [`Fetcher`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// The final URL after redirects
    pub final_url: Url,
    /// HTTP status code
    pub status: u16,
    /// Lower-cased header names to all their values
    pub headers: HashMap<String, Vec<String>>,
    /// Response body bytes
    pub body: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl RawResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network transport used by the coordinator and the robots resolver.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<RawResponse, Error>;
}

/// Whether a validator is an entity tag rather than an HTTP date.
pub fn is_entity_tag(validator: &str) -> bool {
    validator.starts_with('"') || validator.starts_with("W/")
}

/// Header names and values, lower-cased names, values that are not UTF-8 dropped.
pub fn header_multimap(headers: &header::HeaderMap) -> HashMap<String, Vec<String>> {
    let mut out: HashMap<String, Vec<String>> = HashMap::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.entry(name.as_str().to_string())
                .or_default()
                .push(value.to_string());
        }
    }
    out
}

/// reqwest-backed [`Fetcher`] with byte limits and retries.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

enum Attempt {
    Done(RawResponse),
    Retry(Error),
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()
            .map_err(|e| Error::HttpError(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { http, config })
    }

    /// Get reference to the configuration.
    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    async fn attempt(&self, url: &Url, opts: &FetchOptions, last: bool) -> Result<Attempt, Error> {
        let start = Instant::now();

        let mut request = self.http.get(url.as_str()).header(
            header::ACCEPT,
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
        );
        if let Some(timeout) = opts.timeout {
            request = request.timeout(timeout);
        }
        if let Some(validator) = opts.validator.as_deref().filter(|v| !v.is_empty()) {
            let name = if is_entity_tag(validator) { header::IF_NONE_MATCH } else { header::IF_MODIFIED_SINCE };
            request = request.header(name, validator);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let err = if e.is_timeout() {
                    Error::FetchTimeout(format!("{url}: {e}"))
                } else {
                    Error::HttpError(format!("network error: {}", e))
                };
                return if last { Err(err) } else { Ok(Attempt::Retry(err)) };
            }
        };

        let status = response.status().as_u16();
        if RetryPolicy::is_retryable_status(status) && !last {
            return Ok(Attempt::Retry(Error::HttpError(format!("status {status}"))));
        }

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let final_url = response.url().clone();
        let headers = header_multimap(response.headers());

        let body = response
            .bytes()
            .await
            .map_err(|e| Error::HttpError(format!("failed to read response: {}", e)))?;

        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;

        tracing::debug!(%url, %final_url, status, fetch_ms, bytes = body.len(), "fetched");

        Ok(Attempt::Done(RawResponse { final_url, status, headers, body, fetch_ms }))
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, url: &Url, opts: &FetchOptions) -> Result<RawResponse, Error> {
        let retries = self.config.retry.max_retries;
        let mut attempt = 0u32;

        loop {
            match self.attempt(url, opts, attempt >= retries).await? {
                Attempt::Done(response) => return Ok(response),
                Attempt::Retry(err) => {
                    attempt += 1;
                    let delay = self.config.retry.backoff(attempt);
                    tracing::debug!(%url, attempt, ?delay, error = %err, "retrying fetch");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
