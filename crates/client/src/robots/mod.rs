//! robots.txt compliance with caching.
//!
//! Fetches robots.txt per host through the shared [`Fetcher`], parses it into
//! [`CrawlRules`] and caches the rules in a [`Store`] under the `robots:` namespace
//! with their own TTL (24 hours by default).

pub mod rules;

use std::sync::Arc;
use std::time::Duration;

use kindly_core::Store;
use kindly_core::cache::{Entry, keys};
use url::Url;

pub use rules::{CrawlRules, pattern_matches};

use crate::fetch::{FetchOptions, Fetcher, origin_key, robots_path, robots_url};

/// Default TTL for cached robots rules (24 hours).
pub const ROBOTS_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Timeout for a single robots.txt request.
const ROBOTS_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum size of robots.txt to parse (512KB).
const MAX_ROBOTS_SIZE: usize = 512 * 1024;

/// Error type for robots.txt operations.
#[derive(Debug, thiserror::Error)]
pub enum RobotsError {
    #[error("failed to fetch robots.txt: {0}")]
    FetchError(String),

    #[error("unexpected robots.txt status {status} (robots_url: {robots_url})")]
    UnexpectedStatus { status: u16, robots_url: String },

    #[error("robots.txt too large")]
    TooLarge,
}

/// Outcome of a robots check for one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RobotsDecision {
    pub allowed: bool,
    pub crawl_delay: Duration,
}

impl RobotsDecision {
    /// Decision used when robots.txt could not be resolved.
    pub fn fail_open() -> Self {
        Self { allowed: true, crawl_delay: Duration::ZERO }
    }
}

/// Per-host crawl rules resolver.
pub struct CrawlPolicy {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<dyn Store>,
    user_agent: String,
    ttl: Duration,
}

impl CrawlPolicy {
    /// Create a resolver that caches rules in `store` for [`ROBOTS_TTL`].
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<dyn Store>, user_agent: impl Into<String>) -> Self {
        Self { fetcher, store, user_agent: user_agent.into(), ttl: ROBOTS_TTL }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Check whether `url` may be fetched and what crawl delay its host asks for.
    pub async fn check(&self, url: &Url) -> Result<RobotsDecision, RobotsError> {
        let rules = self.rules_for(url).await?;
        let path = robots_path(url);
        let allowed = rules.is_allowed(&path);
        tracing::debug!(%url, allowed, crawl_delay = rules.crawl_delay_secs, "robots check");
        Ok(RobotsDecision { allowed, crawl_delay: rules.crawl_delay() })
    }

    /// Rules for `url`'s host, from cache when possible.
    pub async fn rules_for(&self, url: &Url) -> Result<CrawlRules, RobotsError> {
        let key = keys::robots_key(&origin_key(url));

        match self.store.get(&key).await {
            Ok(Some(entry)) => match serde_json::from_slice::<CrawlRules>(&entry.body) {
                Ok(rules) => {
                    tracing::debug!(%key, "robots.txt cache hit");
                    return Ok(rules);
                }
                Err(e) => tracing::warn!(%key, error = %e, "discarding unreadable cached robots rules"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(%key, error = %e, "robots cache read failed"),
        }

        let rules = self.fetch_rules(url).await?;

        match serde_json::to_vec(&rules) {
            Ok(body) => {
                let entry = Entry::new(key.clone(), 200, body, self.ttl, Duration::ZERO);
                if let Err(e) = self.store.set(&key, entry).await {
                    tracing::warn!(%key, error = %e, "robots cache write failed");
                }
            }
            Err(e) => tracing::warn!(%key, error = %e, "failed to encode robots rules"),
        }

        Ok(rules)
    }

    /// Fetch and parse robots.txt for `url`'s host.
    async fn fetch_rules(&self, url: &Url) -> Result<CrawlRules, RobotsError> {
        let robots_url = robots_url(url).map_err(|e| RobotsError::FetchError(e.to_string()))?;
        let opts = FetchOptions { validator: None, timeout: Some(ROBOTS_TIMEOUT) };

        let response = self
            .fetcher
            .fetch(&robots_url, &opts)
            .await
            .map_err(|e| RobotsError::FetchError(e.to_string()))?;

        if response.status == 404 {
            tracing::debug!(%robots_url, "robots.txt not found, allowing all");
            return Ok(CrawlRules::allow_all());
        }

        if response.status != 200 {
            return Err(RobotsError::UnexpectedStatus {
                status: response.status,
                robots_url: robots_url.to_string(),
            });
        }

        if response.body.len() > MAX_ROBOTS_SIZE {
            return Err(RobotsError::TooLarge);
        }

        let content = String::from_utf8_lossy(&response.body);
        Ok(CrawlRules::parse(&content, &self.user_agent))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RawResponse;
    use async_trait::async_trait;
    use bytes::Bytes;
    use kindly_core::{Error, MemoryStore};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RobotsStub {
        status: u16,
        body: &'static str,
        calls: AtomicUsize,
    }

    impl RobotsStub {
        fn new(status: u16, body: &'static str) -> Arc<Self> {
            Arc::new(Self { status, body, calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Fetcher for RobotsStub {
        async fn fetch(&self, url: &Url, _opts: &FetchOptions) -> Result<RawResponse, Error> {
            assert_eq!(url.path(), "/robots.txt");
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawResponse {
                final_url: url.clone(),
                status: self.status,
                headers: HashMap::new(),
                body: Bytes::from_static(self.body.as_bytes()),
                fetch_ms: 1,
            })
        }
    }

    struct FailingFetcher;

    #[async_trait]
    impl Fetcher for FailingFetcher {
        async fn fetch(&self, _url: &Url, _opts: &FetchOptions) -> Result<RawResponse, Error> {
            Err(Error::HttpError("network error: connection refused".into()))
        }
    }

    fn policy(fetcher: Arc<dyn Fetcher>) -> CrawlPolicy {
        CrawlPolicy::new(fetcher, Arc::new(MemoryStore::default()), "kindly/0.1")
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_missing_robots_allows_everything() {
        let policy = policy(RobotsStub::new(404, "Not Found"));
        for path in ["/", "/private/", "/a/b/c?d=e"] {
            let decision = policy.check(&url(&format!("https://example.com{path}"))).await.unwrap();
            assert!(decision.allowed, "{path}");
            assert_eq!(decision.crawl_delay, Duration::ZERO);
        }
    }

    #[tokio::test]
    async fn test_disallow_and_crawl_delay() {
        let stub = RobotsStub::new(200, "User-agent: *\nDisallow: /private/\nAllow: /private/public/\nCrawl-delay: 5\n");
        let policy = policy(stub.clone());

        let denied = policy.check(&url("https://example.com/private/secret.html")).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.crawl_delay, Duration::from_secs(5));

        let allowed = policy.check(&url("https://example.com/private/public/x.html")).await.unwrap();
        assert!(allowed.allowed);
    }

    #[tokio::test]
    async fn test_rules_are_cached_per_host() {
        let stub = RobotsStub::new(200, "User-agent: *\nDisallow: /x\n");
        let policy = policy(stub.clone());

        policy.check(&url("https://example.com/a")).await.unwrap();
        policy.check(&url("https://example.com/b")).await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        policy.check(&url("https://other.example.com/a")).await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_zero_ttl_refetches() {
        let stub = RobotsStub::new(200, "User-agent: *\nDisallow: /x\n");
        let policy = policy(stub.clone()).with_ttl(Duration::ZERO);

        policy.check(&url("https://example.com/a")).await.unwrap();
        policy.check(&url("https://example.com/a")).await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let policy = policy(RobotsStub::new(503, ""));
        let result = policy.check(&url("https://example.com/")).await;
        assert!(matches!(result, Err(RobotsError::UnexpectedStatus { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_only_ok_status_is_parsed() {
        for status in [204, 206, 403] {
            let policy = policy(RobotsStub::new(status, "User-agent: *\nDisallow: /\n"));
            let result = policy.check(&url("https://example.com/")).await;
            assert!(matches!(result, Err(RobotsError::UnexpectedStatus { status: s, .. }) if s == status));
        }
    }

    #[tokio::test]
    async fn test_transport_error_is_reported() {
        let policy = policy(Arc::new(FailingFetcher));
        let result = policy.check(&url("https://example.com/")).await;
        assert!(matches!(result, Err(RobotsError::FetchError(_))));
    }

    #[test]
    fn test_fail_open_decision() {
        let decision = RobotsDecision::fail_open();
        assert!(decision.allowed);
        assert_eq!(decision.crawl_delay, Duration::ZERO);
    }
}
