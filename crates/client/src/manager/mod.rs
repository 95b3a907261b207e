//! Stale-while-revalidate page cache.
//!
//! | cached entry | returned as | network                                  |
//! |--------------|-------------|------------------------------------------|
//! | Fresh        | `Hit`       | none                                     |
//! | Stale        | `Stale`     | one background refresh per key           |
//! | absent/old   | `Miss`      | foreground fetch, result written back    |
//!
//! Background refreshes send the cached validator. A 304 keeps the cached
//! body and restarts its clock; an error keeps the stale entry as it was.
//! Refreshes are bounded by [`REFRESH_TIMEOUT`] and abort on shutdown.

pub mod inflight;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::FutureExt;
use kindly_core::cache::keys;
use kindly_core::config::CacheBackend;
use kindly_core::{
    AppConfig, Entry, Error, Freshness, MemoryStore, MemoryStoreConfig, RedisStore, RedisStoreConfig, Store,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use url::Url;

pub use inflight::{InFlight, InFlightGuard};

use crate::coordinator::FetchCoordinator;
use crate::extract::NormalizerRegistry;
use crate::fetch::{FetchClient, FetchConfig, Fetcher, RetryPolicy, canonicalize};
use crate::policy::{DomainPolicies, PolicyResolver};
use crate::ratelimit::{HostRateLimiter, RateLimitConfig, RateLimiter};
use crate::robots::CrawlPolicy;

/// Upper bound on one background refresh.
pub const REFRESH_TIMEOUT: Duration = Duration::from_secs(30);

/// How a response was served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Hit,
    Stale,
    Miss,
}

impl CacheState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheState::Hit => "hit",
            CacheState::Stale => "stale",
            CacheState::Miss => "miss",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub entry: Entry,
    pub state: CacheState,
}

/// Shared page cache in front of a [`FetchCoordinator`].
///
/// Cheap to clone; clones share the store, the in-flight registry and the
/// shutdown token.
#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn Store>,
    coordinator: Arc<FetchCoordinator>,
    in_flight: InFlight,
    shutdown: CancellationToken,
    refresh_timeout: Duration,
}

impl CacheManager {
    pub fn new(store: Arc<dyn Store>, coordinator: Arc<FetchCoordinator>) -> Self {
        Self {
            store,
            coordinator,
            in_flight: InFlight::new(),
            shutdown: CancellationToken::new(),
            refresh_timeout: REFRESH_TIMEOUT,
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_timeout = timeout;
        self
    }

    /// Wire a manager from configuration: store backend, HTTP client, robots
    /// resolver, rate limiter, per-domain policies and the HTML normalizer.
    ///
    /// Robots rules share the page store under their own key namespace.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let store: Arc<dyn Store> = match config.cache.backend {
            CacheBackend::Memory => Arc::new(MemoryStore::new(MemoryStoreConfig {
                max_entries: config.cache.max_entries,
                sweep_interval: Duration::from_secs(config.cache.sweep_interval_secs),
            })),
            CacheBackend::Redis => Arc::new(
                RedisStore::connect(RedisStoreConfig {
                    url: config.cache.redis_url.clone(),
                    prefix: config.cache.redis_prefix.clone(),
                    compression_threshold: config.cache.compression_threshold,
                    max_key_len: config.cache.max_key_len,
                })
                .await?,
            ),
        };

        let fetcher: Arc<dyn Fetcher> = Arc::new(FetchClient::new(FetchConfig {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            retry: RetryPolicy { max_retries: config.max_retries, ..RetryPolicy::default() },
            ..FetchConfig::default()
        })?);

        let robots = Arc::new(
            CrawlPolicy::new(Arc::clone(&fetcher), Arc::clone(&store), config.user_agent.as_str())
                .with_ttl(config.robots_ttl()),
        );
        let limiter: Arc<dyn RateLimiter> = Arc::new(HostRateLimiter::new(RateLimitConfig {
            delay: config.delay(),
            requests_per_second: config.requests_per_second,
        }));
        let policies: Arc<dyn PolicyResolver> = Arc::new(DomainPolicies::from_config(config));

        let coordinator = FetchCoordinator::new(fetcher, robots, limiter, policies)
            .with_normalizers(NormalizerRegistry::with_defaults());

        tracing::info!(backend = store.name(), user_agent = %config.user_agent, "cache manager ready");

        Ok(Self::new(store, Arc::new(coordinator)))
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Serve `url` from cache when possible.
    ///
    /// Fresh entries are returned without network access. Stale entries are
    /// returned immediately and refreshed in the background. Anything else is
    /// fetched now and written back.
    pub async fn fetch(&self, url: &str) -> Result<CachedResponse, Error> {
        if self.shutdown.is_cancelled() {
            return Err(Error::Shutdown);
        }

        let url = canonicalize(url)?;
        let key = keys::page_key(url.as_str());

        let cached = match self.store.get(&key).await {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!(%key, store = self.store.name(), error = %e, "cache read failed, treating as miss");
                None
            }
        };

        if let Some(entry) = cached {
            match entry.state() {
                Freshness::Fresh => {
                    tracing::debug!(%key, "cache hit");
                    return Ok(CachedResponse { entry, state: CacheState::Hit });
                }
                Freshness::Stale => {
                    tracing::debug!(%key, "serving stale entry");
                    self.spawn_refresh(key, url, entry.clone());
                    return Ok(CachedResponse { entry, state: CacheState::Stale });
                }
                Freshness::TooOld => {}
            }
        }

        tracing::debug!(%key, "cache miss");
        let entry = self
            .coordinator
            .fetch(&url, None)
            .await?
            .ok_or_else(|| Error::HttpError(format!("{url} answered 304 to an unconditional request")))?;

        if let Err(e) = self.store.set(&key, entry.clone()).await {
            tracing::warn!(%key, store = self.store.name(), error = %e, "cache write failed");
        }

        Ok(CachedResponse { entry, state: CacheState::Miss })
    }

    /// Cached entry for `url` without touching the network. Too-old entries are absent.
    pub async fn peek(&self, url: &str) -> Result<Option<CachedResponse>, Error> {
        let url = canonicalize(url)?;
        let cached = self.store.get(&keys::page_key(url.as_str())).await?;
        Ok(cached.and_then(|entry| {
            let state = match entry.state() {
                Freshness::Fresh => CacheState::Hit,
                Freshness::Stale => CacheState::Stale,
                Freshness::TooOld => return None,
            };
            Some(CachedResponse { entry, state })
        }))
    }

    /// Drop the cached page for `url`.
    pub async fn invalidate(&self, url: &str) -> Result<(), Error> {
        let url = canonicalize(url)?;
        let key = keys::page_key(url.as_str());
        self.store.delete(&key).await?;
        tracing::debug!(%key, "invalidated");
        Ok(())
    }

    /// Empty the backing store, cached robots rules included.
    pub async fn clear(&self) -> Result<(), Error> {
        self.store.clear().await?;
        tracing::info!(store = self.store.name(), "cache cleared");
        Ok(())
    }

    /// Whether a background refresh for `url` is running.
    pub fn is_refreshing(&self, url: &str) -> bool {
        canonicalize(url)
            .map(|url| self.in_flight.contains(&keys::page_key(url.as_str())))
            .unwrap_or(false)
    }

    /// Stop background work and release resources.
    ///
    /// Running refreshes are cancelled, not awaited. Later calls to
    /// [`fetch`](Self::fetch) fail with [`Error::Shutdown`].
    pub async fn shutdown(&self) -> Result<(), Error> {
        self.shutdown.cancel();
        self.coordinator.limiter().close();
        tracing::info!(in_flight = self.in_flight.len(), "cache manager shutting down");
        self.store.close().await
    }

    fn spawn_refresh(&self, key: String, url: Url, stale: Entry) {
        if self.shutdown.is_cancelled() {
            return;
        }
        let Some(guard) = self.in_flight.try_acquire(&key) else {
            tracing::debug!(%key, "refresh already in flight");
            return;
        };

        let store = Arc::clone(&self.store);
        let coordinator = Arc::clone(&self.coordinator);
        let shutdown = self.shutdown.clone();
        let timeout = self.refresh_timeout;

        tokio::spawn(async move {
            let _guard = guard;
            let work = AssertUnwindSafe(revalidate(store.as_ref(), coordinator.as_ref(), &key, &url, stale)).catch_unwind();

            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::debug!(%key, "refresh cancelled by shutdown");
                }
                outcome = tokio::time::timeout(timeout, work) => match outcome {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(e))) => tracing::warn!(%key, error = %e, "background refresh failed, keeping stale entry"),
                    Ok(Err(panic)) => {
                        tracing::error!(%key, panic = %panic_message(panic.as_ref()), "background refresh panicked")
                    }
                    Err(_) => tracing::warn!(%key, ?timeout, "background refresh timed out"),
                },
            }
        });
    }
}

async fn revalidate(
    store: &dyn Store, coordinator: &FetchCoordinator, key: &str, url: &Url, stale: Entry,
) -> Result<(), Error> {
    let refreshed = match coordinator.fetch(url, stale.validator.as_deref()).await? {
        Some(entry) => {
            tracing::debug!(%key, "refreshed");
            entry
        }
        None => {
            tracing::debug!(%key, "not modified, extending entry");
            stale.touched(Utc::now())
        }
    };
    store.set(key, refreshed).await
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
