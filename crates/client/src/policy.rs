//! Effective per-URL fetch policy.

use std::collections::HashMap;
use std::time::Duration;

use kindly_core::AppConfig;
use kindly_core::config::{DomainOverride, find_domain_override};
use url::Url;

/// Settings that govern one fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPolicy {
    pub timeout: Duration,
    pub respect_robots: bool,
    pub ttl: Duration,
    pub stale_window: Duration,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            respect_robots: true,
            ttl: Duration::from_secs(3_600),
            stale_window: Duration::from_secs(86_400),
        }
    }
}

/// Maps a URL to the policy used to fetch it.
pub trait PolicyResolver: Send + Sync {
    fn resolve(&self, url: &Url) -> FetchPolicy;
}

/// Global defaults plus per-domain overrides; subdomains inherit a parent's override.
#[derive(Debug, Clone, Default)]
pub struct DomainPolicies {
    defaults: FetchPolicy,
    overrides: HashMap<String, DomainOverride>,
}

impl DomainPolicies {
    pub fn new(defaults: FetchPolicy) -> Self {
        Self { defaults, overrides: HashMap::new() }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        let defaults = FetchPolicy {
            timeout: config.timeout(),
            respect_robots: config.respect_robots,
            ttl: config.page_ttl(),
            stale_window: config.stale_window(),
        };
        let overrides = config
            .domains
            .iter()
            .map(|(host, o)| (host.to_ascii_lowercase(), o.clone()))
            .collect();
        Self { defaults, overrides }
    }

    pub fn with_override(mut self, host: impl Into<String>, domain: DomainOverride) -> Self {
        self.overrides.insert(host.into().to_ascii_lowercase(), domain);
        self
    }
}

impl PolicyResolver for DomainPolicies {
    fn resolve(&self, url: &Url) -> FetchPolicy {
        let Some(domain) = url.host_str().and_then(|host| find_domain_override(&self.overrides, host)) else {
            return self.defaults.clone();
        };

        FetchPolicy {
            timeout: domain.timeout_ms.map_or(self.defaults.timeout, Duration::from_millis),
            respect_robots: domain.respect_robots.unwrap_or(self.defaults.respect_robots),
            ttl: domain.ttl_secs.map_or(self.defaults.ttl, Duration::from_secs),
            stale_window: domain.stale_window_secs.map_or(self.defaults.stale_window, Duration::from_secs),
        }
    }
}
