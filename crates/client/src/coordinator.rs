//! Network side of the cache: one policy-checked, rate-limited fetch.
//!
//! Order of operations for every fetch:
//!
//! 1. Resolve the [`FetchPolicy`] for the URL.
//! 2. If robots.txt is respected, check it. A disallowed path fails before any
//!    request is sent; a declared crawl delay is handed to the rate limiter. An
//!    unavailable robots.txt fails open.
//! 3. Wait for the host's rate-limit slot, then fetch (conditionally, when a
//!    validator is supplied).
//! 4. Build a new [`Entry`]: metadata from HTML, body run through the normalizer
//!    registered for its media type.

use std::sync::Arc;

use kindly_core::{Entry, Error};
use url::Url;

use crate::extract::{NormalizerRegistry, PageMetadata, is_html};
use crate::fetch::{FetchOptions, Fetcher, RawResponse};
use crate::policy::{FetchPolicy, PolicyResolver};
use crate::ratelimit::RateLimiter;
use crate::robots::{CrawlPolicy, RobotsDecision};

pub struct FetchCoordinator {
    fetcher: Arc<dyn Fetcher>,
    robots: Arc<CrawlPolicy>,
    limiter: Arc<dyn RateLimiter>,
    policies: Arc<dyn PolicyResolver>,
    normalizers: NormalizerRegistry,
}

impl FetchCoordinator {
    pub fn new(
        fetcher: Arc<dyn Fetcher>, robots: Arc<CrawlPolicy>, limiter: Arc<dyn RateLimiter>,
        policies: Arc<dyn PolicyResolver>,
    ) -> Self {
        Self { fetcher, robots, limiter, policies, normalizers: NormalizerRegistry::new() }
    }

    pub fn with_normalizers(mut self, normalizers: NormalizerRegistry) -> Self {
        self.normalizers = normalizers;
        self
    }

    pub fn limiter(&self) -> &Arc<dyn RateLimiter> {
        &self.limiter
    }

    /// Fetch `url`, conditionally when `validator` is set.
    ///
    /// Returns `Ok(None)` when the server answers 304 Not Modified.
    pub async fn fetch(&self, url: &Url, validator: Option<&str>) -> Result<Option<Entry>, Error> {
        let policy = self.policies.resolve(url);

        if policy.respect_robots {
            let decision = match self.robots.check(url).await {
                Ok(decision) => decision,
                Err(e) => {
                    tracing::warn!(%url, error = %e, "robots.txt unavailable, failing open");
                    RobotsDecision::fail_open()
                }
            };

            if !decision.allowed {
                return Err(Error::RobotsDisallowed(format!("{url} is disallowed for {}", self.robots.user_agent())));
            }
            if !decision.crawl_delay.is_zero() {
                self.limiter.update_delay(url, decision.crawl_delay);
            }
        }

        self.limiter.acquire(url).await?;

        let opts = FetchOptions {
            validator: validator.filter(|v| !v.is_empty()).map(str::to_string),
            timeout: Some(policy.timeout),
        };
        let response = self.fetcher.fetch(url, &opts).await?;

        if response.status == 304 {
            tracing::debug!(%url, "not modified");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(Error::HttpError(format!("{url} returned status {}", response.status)));
        }

        self.build_entry(url, response, &policy).map(Some)
    }

    /// The entry is keyed by the requested URL; the normalizer sees the URL the
    /// body was actually served from.
    fn build_entry(&self, url: &Url, response: RawResponse, policy: &FetchPolicy) -> Result<Entry, Error> {
        let content_type = response.header("content-type").map(str::to_string);
        let validator = response
            .header("last-modified")
            .or_else(|| response.header("etag"))
            .map(str::to_string);

        let metadata = match content_type.as_deref() {
            Some(ct) if is_html(ct) => PageMetadata::from_html(&String::from_utf8_lossy(&response.body)),
            _ => PageMetadata::default(),
        };

        let normalized = match content_type.as_deref() {
            Some(ct) => self.normalizers.normalize(&response.final_url, ct, &response.body)?,
            None => None,
        };
        let body = normalized.unwrap_or_else(|| response.body.to_vec());

        let mut entry = Entry::new(url.as_str(), response.status, body, policy.ttl, policy.stale_window);
        entry.headers = response.headers;
        entry.title = metadata.title;
        entry.description = metadata.description;
        entry.validator = validator;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Normalizer;
    use crate::policy::DomainPolicies;
    use crate::testing::{RecordingLimiter, Reply, StubFetcher};
    use kindly_core::config::DomainOverride;
    use kindly_core::{Freshness, MemoryStore};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const PAGE: &str = r#"<html><head><title>Hello</title><meta name="description" content="A page."></head><body><p>hi</p></body></html>"#;

    struct Harness {
        fetcher: Arc<StubFetcher>,
        limiter: Arc<RecordingLimiter>,
        coordinator: FetchCoordinator,
    }

    fn harness(policies: DomainPolicies) -> Harness {
        let fetcher = Arc::new(StubFetcher::new());
        let limiter = Arc::new(RecordingLimiter::default());
        let robots = Arc::new(CrawlPolicy::new(fetcher.clone(), Arc::new(MemoryStore::default()), "kindly/0.1"));
        let coordinator = FetchCoordinator::new(fetcher.clone(), robots, limiter.clone(), Arc::new(policies));
        Harness { fetcher, limiter, coordinator }
    }

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_builds_entry() {
        let h = harness(DomainPolicies::new(FetchPolicy {
            ttl: Duration::from_secs(60),
            stale_window: Duration::from_secs(30),
            ..FetchPolicy::default()
        }));
        h.fetcher.route(
            "/page",
            Reply::html(PAGE)
                .header("Last-Modified", "Wed, 21 Oct 2015 07:28:00 GMT")
                .header("ETag", "\"abc\""),
        );

        let entry = h.coordinator.fetch(&url("https://example.com/page"), None).await.unwrap().unwrap();

        assert_eq!(entry.url, "https://example.com/page");
        assert_eq!(entry.status, 200);
        assert_eq!(entry.body, PAGE.as_bytes());
        assert_eq!(entry.title.as_deref(), Some("Hello"));
        assert_eq!(entry.description.as_deref(), Some("A page."));
        assert_eq!(entry.validator.as_deref(), Some("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(entry.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(entry.ttl, Duration::from_secs(60));
        assert_eq!(entry.stale_window, Duration::from_secs(30));
        assert_eq!(entry.state(), Freshness::Fresh);
        assert_eq!(h.limiter.acquired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_entry_keeps_requested_url_after_redirect() {
        let h = harness(DomainPolicies::default());
        h.fetcher.route("/old", Reply::html(PAGE).redirected_to("https://example.com/new"));

        let entry = h.coordinator.fetch(&url("https://example.com/old"), None).await.unwrap().unwrap();
        assert_eq!(entry.url, "https://example.com/old");
        assert_eq!(entry.title.as_deref(), Some("Hello"));
    }

    #[tokio::test]
    async fn test_etag_used_without_last_modified() {
        let h = harness(DomainPolicies::default());
        h.fetcher.route("/data", Reply::ok("application/json", "{}").header("ETag", "W/\"v2\""));

        let entry = h.coordinator.fetch(&url("https://example.com/data"), None).await.unwrap().unwrap();
        assert_eq!(entry.validator.as_deref(), Some("W/\"v2\""));
        assert_eq!(entry.title, None);
    }

    #[tokio::test]
    async fn test_disallowed_never_fetches_page() {
        let h = harness(DomainPolicies::default());
        h.fetcher
            .route("/robots.txt", Reply::ok("text/plain", "User-agent: *\nDisallow: /private/\n"))
            .route("/private/x", Reply::html(PAGE));

        let result = h.coordinator.fetch(&url("https://example.com/private/x"), None).await;

        assert!(matches!(result, Err(Error::RobotsDisallowed(_))));
        assert_eq!(h.fetcher.page_calls(), 0);
        assert_eq!(h.limiter.acquired.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_crawl_delay_reaches_limiter() {
        let h = harness(DomainPolicies::default());
        h.fetcher
            .route("/robots.txt", Reply::ok("text/plain", "User-agent: *\nCrawl-delay: 5\n"))
            .route("/", Reply::html(PAGE));

        h.coordinator.fetch(&url("https://example.com/"), None).await.unwrap();
        assert_eq!(*h.limiter.delays.lock().unwrap(), vec![Duration::from_secs(5)]);
    }

    #[tokio::test]
    async fn test_robots_failure_fails_open() {
        let h = harness(DomainPolicies::default());
        h.fetcher
            .route("/robots.txt", Reply::status(500))
            .route("/", Reply::html(PAGE));

        let entry = h.coordinator.fetch(&url("https://example.com/"), None).await.unwrap();
        assert!(entry.is_some());
        assert!(h.limiter.delays.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_robots_skipped_when_disabled() {
        let policies = DomainPolicies::default()
            .with_override("example.com", DomainOverride { respect_robots: Some(false), ..Default::default() });
        let h = harness(policies);
        h.fetcher
            .route("/robots.txt", Reply::ok("text/plain", "User-agent: *\nDisallow: /\n"))
            .route("/", Reply::html(PAGE));

        assert!(h.coordinator.fetch(&url("https://example.com/"), None).await.unwrap().is_some());
        assert_eq!(h.fetcher.robots_calls(), 0);
    }

    #[tokio::test]
    async fn test_not_modified_returns_none() {
        let h = harness(DomainPolicies::default());
        h.fetcher.route("/page", Reply::status(304));

        let result = h.coordinator.fetch(&url("https://example.com/page"), Some("\"abc\"")).await.unwrap();

        assert!(result.is_none());
        assert_eq!(h.fetcher.validators(), vec![Some("\"abc\"".to_string())]);
    }

    #[tokio::test]
    async fn test_empty_validator_is_not_sent() {
        let h = harness(DomainPolicies::default());
        h.fetcher.route("/page", Reply::html(PAGE));

        h.coordinator.fetch(&url("https://example.com/page"), Some("")).await.unwrap();
        assert_eq!(h.fetcher.validators(), vec![None]);
    }

    #[tokio::test]
    async fn test_error_status_is_http_error() {
        let h = harness(DomainPolicies::default());
        h.fetcher.route("/gone", Reply::status(410));

        let result = h.coordinator.fetch(&url("https://example.com/gone"), None).await;
        assert!(matches!(result, Err(Error::HttpError(msg)) if msg.contains("410")));
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let h = harness(DomainPolicies::default());
        h.fetcher.route("/flaky", Reply::Fail);

        let result = h.coordinator.fetch(&url("https://example.com/flaky"), None).await;
        assert!(matches!(result, Err(Error::HttpError(_))));
    }

    struct Tagging;

    impl Normalizer for Tagging {
        fn name(&self) -> &'static str {
            "tagging"
        }

        fn normalize(&self, url: &Url, body: &[u8]) -> Result<Vec<u8>, Error> {
            Ok(format!("{url}|{}", body.len()).into_bytes())
        }
    }

    struct Rejecting;

    impl Normalizer for Rejecting {
        fn name(&self) -> &'static str {
            "rejecting"
        }

        fn normalize(&self, _url: &Url, _body: &[u8]) -> Result<Vec<u8>, Error> {
            Err(Error::NormalizeFailed("unsupported document".into()))
        }
    }

    #[tokio::test]
    async fn test_normalizer_receives_url() {
        let mut registry = NormalizerRegistry::new();
        registry.register("text/plain", Arc::new(Tagging));

        let mut h = harness(DomainPolicies::default());
        h.coordinator = h.coordinator.with_normalizers(registry);
        h.fetcher.route("/notes.txt", Reply::ok("text/plain", "12345"));

        let entry = h.coordinator.fetch(&url("https://example.com/notes.txt"), None).await.unwrap().unwrap();
        assert_eq!(entry.body, b"https://example.com/notes.txt|5");
    }

    #[tokio::test]
    async fn test_normalizer_failure_aborts_fetch() {
        let mut registry = NormalizerRegistry::new();
        registry.register("text/html", Arc::new(Rejecting));

        let mut h = harness(DomainPolicies::default());
        h.coordinator = h.coordinator.with_normalizers(registry);
        h.fetcher.route("/", Reply::html(PAGE));

        let result = h.coordinator.fetch(&url("https://example.com/"), None).await;
        assert!(matches!(result, Err(Error::NormalizeFailed(_))));
    }
}
