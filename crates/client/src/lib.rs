//! Client side of kindly.
//!
//! This crate provides the polite fetch pipeline (robots.txt, per-host rate
//! limiting, retries, HTML normalization) and the stale-while-revalidate
//! `CacheManager` the server is built on.

pub mod coordinator;
pub mod extract;
pub mod fetch;
pub mod manager;
pub mod policy;
pub mod ratelimit;
pub mod robots;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::FetchCoordinator;
pub use extract::{Normalizer, NormalizerRegistry, PageMetadata, ReadableHtml};
pub use fetch::{FetchClient, FetchConfig, FetchOptions, Fetcher, RawResponse, RetryPolicy, canonicalize};
pub use manager::{CacheManager, CacheState, CachedResponse, REFRESH_TIMEOUT};
pub use policy::{DomainPolicies, FetchPolicy, PolicyResolver};
pub use ratelimit::{HostRateLimiter, RateLimitConfig, RateLimiter};
pub use robots::{CrawlPolicy, CrawlRules, RobotsDecision, RobotsError};
