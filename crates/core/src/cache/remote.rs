//! Redis-backed store.
//!
//! Expiry is delegated to Redis: every write carries a `PX` of ttl + stale window,
//! after which Redis discards the key on its own. No LRU bookkeeping happens here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use super::{Entry, Freshness, Store, codec, keys};
use crate::Error;

/// Number of keys requested per `SCAN` round during `clear`.
const SCAN_BATCH: usize = 500;

/// Configuration for [`RedisStore`].
#[derive(Debug, Clone)]
pub struct RedisStoreConfig {
    /// Connection URL (default: redis://127.0.0.1:6379).
    pub url: String,
    /// Prefix for every key written by this store (default: "kindly:").
    pub prefix: String,
    /// Compress serialized payloads at or above this size; `None` disables (default: 1024).
    pub compression_threshold: Option<usize>,
    /// Keys longer than this are hashed (default: 1024).
    pub max_key_len: usize,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            prefix: "kindly:".to_string(),
            compression_threshold: Some(1024),
            max_key_len: 1024,
        }
    }
}

/// Remote store over a multiplexed, auto-reconnecting Redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
    config: RedisStoreConfig,
}

impl RedisStore {
    /// Connect to Redis.
    pub async fn connect(config: RedisStoreConfig) -> Result<Self, Error> {
        let client = redis::Client::open(config.url.as_str())?;
        let conn = ConnectionManager::new(client).await?;
        tracing::debug!(prefix = %config.prefix, "connected to redis cache backend");
        Ok(Self { conn, config })
    }

    fn key(&self, key: &str) -> String {
        keys::remote_key(&self.config.prefix, key, self.config.max_key_len)
    }

    pub fn config(&self) -> &RedisStoreConfig {
        &self.config
    }
}

/// Native expiry for an entry in milliseconds; Redis rejects a zero `PX`.
pub(crate) fn expiry_millis(entry: &Entry) -> u64 {
    u64::try_from(entry.expires_after().as_millis())
        .unwrap_or(u64::MAX)
        .max(1)
}

/// Decode a stored payload, or `None` once the entry is past its stale window.
pub(crate) fn live_entry(payload: &[u8], now: DateTime<Utc>) -> Result<Option<Entry>, Error> {
    let entry = codec::decode(payload)?;
    Ok((entry.state_at(now) != Freshness::TooOld).then_some(entry))
}

/// `SET key payload PX <ttl + stale window>`.
pub(crate) fn set_command(redis_key: &str, payload: Vec<u8>, entry: &Entry) -> redis::Cmd {
    let mut cmd = redis::cmd("SET");
    cmd.arg(redis_key).arg(payload).arg("PX").arg(expiry_millis(entry));
    cmd
}

/// One `SCAN` round over every key under `prefix`.
pub(crate) fn scan_command(prefix: &str, cursor: u64) -> redis::Cmd {
    let mut cmd = redis::cmd("SCAN");
    cmd.arg(cursor)
        .arg("MATCH")
        .arg(format!("{prefix}*"))
        .arg("COUNT")
        .arg(SCAN_BATCH);
    cmd
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Entry>, Error> {
        let redis_key = self.key(key);
        let mut conn = self.conn.clone();

        let payload: Option<Vec<u8>> = conn.get(&redis_key).await?;
        let Some(payload) = payload else {
            return Ok(None);
        };

        let entry = live_entry(&payload, Utc::now())?;
        if entry.is_none() {
            let _: () = conn.del(&redis_key).await?;
        }
        Ok(entry)
    }

    async fn set(&self, key: &str, entry: Entry) -> Result<(), Error> {
        let redis_key = self.key(key);
        let payload = codec::encode(&entry, self.config.compression_threshold)?;
        let mut conn = self.conn.clone();

        let _: () = set_command(&redis_key, payload, &entry).query_async(&mut conn).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(self.key(key)).await?;
        Ok(())
    }

    /// Deletes every key under the prefix. Best effort: keys written concurrently may survive.
    async fn clear(&self) -> Result<(), Error> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, batch): (u64, Vec<String>) =
                scan_command(&self.config.prefix, cursor).query_async(&mut conn).await?;

            if !batch.is_empty() {
                deleted += batch.len();
                let _: () = conn.del(batch).await?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::debug!(deleted, prefix = %self.config.prefix, "cleared redis cache prefix");
        Ok(())
    }

    async fn close(&self) -> Result<(), Error> {
        tracing::debug!("closing redis cache backend");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
