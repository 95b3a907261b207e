//! Bounded in-process LRU store.
//!
//! The map and recency list live in one `lru::LruCache` behind a single mutex.
//! The mutex is never held across an `.await`. A background sweeper drops
//! entries that expired without ever being read again.

use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lru::LruCache;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::{Entry, Freshness, Store};
use crate::Error;

/// Configuration for [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Maximum number of entries before the least recently used is evicted (default: 10000).
    pub max_entries: usize,
    /// How often expired entries are swept (default: 60s).
    pub sweep_interval: Duration,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self { max_entries: 10_000, sweep_interval: Duration::from_secs(60) }
    }
}

type Entries = Arc<Mutex<LruCache<String, Entry>>>;

/// In-memory LRU store with periodic sweeping.
///
/// Must be created inside a Tokio runtime; the sweeper is spawned on construction.
pub struct MemoryStore {
    entries: Entries,
    shutdown: CancellationToken,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl MemoryStore {
    pub fn new(config: MemoryStoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(NonZeroUsize::MIN);
        let entries: Entries = Arc::new(Mutex::new(LruCache::new(capacity)));
        let shutdown = CancellationToken::new();

        let sweeper = tokio::spawn(sweep_loop(entries.clone(), config.sweep_interval, shutdown.clone()));

        Self { entries, shutdown, sweeper: Mutex::new(Some(sweeper)) }
    }

    /// Number of entries currently held, expired or not.
    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry that is too old at `now`. Returns how many were removed.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        purge_expired(&self.entries, now)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn lock(entries: &Entries) -> MutexGuard<'_, LruCache<String, Entry>> {
    entries.lock().unwrap_or_else(PoisonError::into_inner)
}

fn purge_expired(entries: &Entries, now: DateTime<Utc>) -> usize {
    let mut cache = lock(entries);
    let expired: Vec<String> = cache
        .iter()
        .filter(|(_, entry)| entry.state_at(now) == Freshness::TooOld)
        .map(|(key, _)| key.clone())
        .collect();

    for key in &expired {
        cache.pop(key);
    }
    expired.len()
}

async fn sweep_loop(entries: Entries, interval: Duration, shutdown: CancellationToken) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately; nothing can be expired yet.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                let removed = purge_expired(&entries, Utc::now());
                if removed > 0 {
                    tracing::debug!(removed, "memory store sweep removed expired entries");
                }
            }
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, Error> {
        let mut cache = lock(&self.entries);

        let too_old = match cache.peek(key) {
            None => return Ok(None),
            Some(entry) => entry.state() == Freshness::TooOld,
        };

        if too_old {
            cache.pop(key);
            return Ok(None);
        }

        Ok(cache.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<(), Error> {
        let mut cache = lock(&self.entries);
        if let Some((evicted, _)) = cache.push(key.to_string(), entry)
            && evicted != key
        {
            tracing::trace!(key = %evicted, "memory store evicted least recently used entry");
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        lock(&self.entries).pop(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        lock(&self.entries).clear();
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        self.shutdown.cancel();
        let handle = self
            .sweeper
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            tracing::warn!(error = %e, "memory store sweeper ended abnormally");
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
