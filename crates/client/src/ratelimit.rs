//! Per-host request pacing.
//!
//! Each host gets a "next allowed" instant. `acquire` reserves the next slot
//! under the lock and sleeps after releasing it, so concurrent callers for one
//! host queue up without holding the lock while they wait.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use kindly_core::Error;
use tokio::time::Instant;
use url::Url;

use crate::fetch::origin_key;

/// Longest spacing the limiter will enforce between two requests to one host.
pub const MAX_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Request pacing consulted before every network call.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Wait until a request to `url`'s host may be sent.
    async fn acquire(&self, url: &Url) -> Result<(), Error>;

    /// Merge a site-declared crawl delay for `url`'s host.
    fn update_delay(&self, url: &Url, delay: Duration);

    /// Spacing currently enforced between requests to `url`'s host.
    fn effective_delay(&self, url: &Url) -> Duration;

    /// Drop any per-host state.
    fn close(&self) {}
}

/// Configuration for [`HostRateLimiter`].
#[derive(Debug, Clone, Default)]
pub struct RateLimitConfig {
    /// Minimum spacing between requests to one host (default: 0).
    pub delay: Duration,
    /// Throughput-based pacing; replaced by a flat delay once a host declares a crawl delay.
    pub requests_per_second: Option<f64>,
}

#[derive(Debug, Default)]
struct HostSlot {
    next_allowed: Option<Instant>,
    crawl_delay: Option<Duration>,
}

/// In-process [`RateLimiter`] keyed by origin.
#[derive(Debug, Default)]
pub struct HostRateLimiter {
    config: RateLimitConfig,
    hosts: Mutex<HashMap<String, HostSlot>>,
}

impl HostRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self { config, hosts: Mutex::new(HashMap::new()) }
    }

    fn hosts(&self) -> MutexGuard<'_, HashMap<String, HostSlot>> {
        self.hosts.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn interval(&self, slot: Option<&HostSlot>) -> Duration {
        let interval = match (slot.and_then(|s| s.crawl_delay), self.config.requests_per_second) {
            (Some(flat), _) => flat,
            (None, Some(rps)) if rps > 0.0 => Duration::try_from_secs_f64(1.0 / rps).unwrap_or(MAX_INTERVAL),
            (None, _) => self.config.delay,
        };
        interval.min(MAX_INTERVAL)
    }

    /// Drop slots with nothing left to enforce: no crawl delay and no
    /// reservation in the future.
    fn evict_idle(hosts: &mut HashMap<String, HostSlot>, now: Instant) {
        hosts.retain(|_, slot| slot.crawl_delay.is_some() || slot.next_allowed.is_some_and(|next| next > now));
    }

    #[cfg(test)]
    fn tracked_hosts(&self) -> usize {
        self.hosts().len()
    }
}

#[async_trait]
impl RateLimiter for HostRateLimiter {
    async fn acquire(&self, url: &Url) -> Result<(), Error> {
        let wake_at = {
            let mut hosts = self.hosts();
            let now = Instant::now();
            Self::evict_idle(&mut hosts, now);

            let key = origin_key(url);
            let interval = self.interval(hosts.get(&key));
            let slot = hosts.entry(key).or_default();

            let start = slot.next_allowed.map_or(now, |next| next.max(now));
            slot.next_allowed = Some(start.checked_add(interval).unwrap_or(start));
            start
        };

        if wake_at > Instant::now() {
            tracing::trace!(%url, wait = ?(wake_at - Instant::now()), "rate limited");
            tokio::time::sleep_until(wake_at).await;
        }
        Ok(())
    }

    fn update_delay(&self, url: &Url, delay: Duration) {
        let merged = self.config.delay.max(delay).min(MAX_INTERVAL);
        let mut hosts = self.hosts();
        let slot = hosts.entry(origin_key(url)).or_default();
        if slot.crawl_delay != Some(merged) {
            tracing::debug!(host = %origin_key(url), delay = ?merged, "applying crawl delay");
        }
        slot.crawl_delay = Some(merged);
    }

    fn effective_delay(&self, url: &Url) -> Duration {
        let hosts = self.hosts();
        self.interval(hosts.get(&origin_key(url)))
    }

    fn close(&self) {
        self.hosts().clear();
    }
}
