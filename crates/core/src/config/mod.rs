//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (KINDLY_*)
//! 2. TOML config file (if KINDLY_CONFIG_FILE set)
//! 3. Built-in defaults

use std::collections::HashMap;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (KINDLY_*, nested keys separated by `__`)
/// 2. TOML config file (if KINDLY_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// User-Agent string for HTTP requests and robots.txt group matching.
    ///
    /// Set via KINDLY_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via KINDLY_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// HTTP request timeout in milliseconds.
    ///
    /// Set via KINDLY_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Whether to respect robots.txt rules.
    ///
    /// Set via KINDLY_RESPECT_ROBOTS environment variable.
    #[serde(default = "default_true")]
    pub respect_robots: bool,

    /// Seconds a fetched page is served as fresh.
    #[serde(default = "default_page_ttl_secs")]
    pub page_ttl_secs: u64,

    /// Seconds after the TTL during which a page is served stale while it revalidates.
    #[serde(default = "default_stale_window_secs")]
    pub stale_window_secs: u64,

    /// Seconds a parsed robots.txt is cached per host.
    #[serde(default = "default_robots_ttl_secs")]
    pub robots_ttl_secs: u64,

    /// Minimum spacing between requests to one host, in milliseconds.
    #[serde(default)]
    pub delay_ms: u64,

    /// Optional per-host request rate; ignored for hosts that declare a crawl-delay.
    #[serde(default)]
    pub requests_per_second: Option<f64>,

    /// Retries for transient transport failures, 429 and 5xx responses.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Cache backend settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Per-host overrides keyed by domain; subdomains inherit a parent's entry.
    #[serde(default)]
    pub domains: HashMap<String, DomainOverride>,
}

/// Which `Store` implementation backs the page cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

/// Cache backend configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Set via KINDLY_CACHE__BACKEND (`memory` or `redis`).
    #[serde(default)]
    pub backend: CacheBackend,

    /// Capacity of the in-memory LRU store.
    #[serde(default = "default_max_entries")]
    pub max_entries: usize,

    /// Interval of the in-memory sweeper that drops expired entries.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Prefix prepended to every Redis key.
    #[serde(default = "default_redis_prefix")]
    pub redis_prefix: String,

    /// Serialized payloads at or above this many bytes are gzip-compressed.
    /// `None` disables compression.
    #[serde(default = "default_compression_threshold")]
    pub compression_threshold: Option<usize>,

    /// Longest Redis key stored verbatim; longer keys are hashed.
    #[serde(default = "default_max_key_len")]
    pub max_key_len: usize,
}

/// Per-host fetch policy override. Unset fields fall back to the global values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DomainOverride {
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub respect_robots: Option<bool>,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
    #[serde(default)]
    pub stale_window_secs: Option<u64>,
}

fn default_user_agent() -> String {
    "kindly/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_page_ttl_secs() -> u64 {
    3_600
}

fn default_stale_window_secs() -> u64 {
    86_400
}

fn default_robots_ttl_secs() -> u64 {
    86_400
}

fn default_max_retries() -> u32 {
    2
}

fn default_max_entries() -> usize {
    10_000
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".into()
}

fn default_redis_prefix() -> String {
    "kindly:".into()
}

fn default_compression_threshold() -> Option<usize> {
    Some(1024)
}

fn default_max_key_len() -> usize {
    1024
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            max_entries: default_max_entries(),
            sweep_interval_secs: default_sweep_interval_secs(),
            redis_url: default_redis_url(),
            redis_prefix: default_redis_prefix(),
            compression_threshold: default_compression_threshold(),
            max_key_len: default_max_key_len(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            respect_robots: true,
            page_ttl_secs: default_page_ttl_secs(),
            stale_window_secs: default_stale_window_secs(),
            robots_ttl_secs: default_robots_ttl_secs(),
            delay_ms: 0,
            requests_per_second: None,
            max_retries: default_max_retries(),
            cache: CacheConfig::default(),
            domains: HashMap::new(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn page_ttl(&self) -> Duration {
        Duration::from_secs(self.page_ttl_secs)
    }

    pub fn stale_window(&self) -> Duration {
        Duration::from_secs(self.stale_window_secs)
    }

    pub fn robots_ttl(&self) -> Duration {
        Duration::from_secs(self.robots_ttl_secs)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `KINDLY_`
    /// 2. TOML file from `KINDLY_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("KINDLY_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("KINDLY_")
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Override for `host`, checking the host itself and then each parent domain.
    pub fn domain_override(&self, host: &str) -> Option<&DomainOverride> {
        find_domain_override(&self.domains, host)
    }
}

/// Walk `host` and its parent domains (never a bare TLD) looking for an override.
pub fn find_domain_override<'a>(domains: &'a HashMap<String, DomainOverride>, host: &str) -> Option<&'a DomainOverride> {
    let mut candidate = host;
    loop {
        if let Some(found) = domains.get(candidate) {
            return Some(found);
        }
        match candidate.split_once('.') {
            Some((_, parent)) if parent.contains('.') => candidate = parent,
            _ => return None,
        }
    }
}
