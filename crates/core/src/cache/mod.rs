//! Key to entry stores shared by the page cache and the robots cache.
//!
//! This module provides:
//!
//! - `Entry` and its `Fresh` / `Stale` / `TooOld` classification
//! - The `Store` trait every backend implements
//! - `MemoryStore`: bounded LRU with periodic sweeping
//! - `RedisStore`: remote store with native expiry and optional gzip payloads
//! - Key namespacing so several logical caches share one backend

pub mod codec;
pub mod entry;
pub mod keys;
pub mod memory;
pub mod remote;

use async_trait::async_trait;

pub use crate::Error;

pub use entry::{Entry, Freshness};
pub use memory::{MemoryStore, MemoryStoreConfig};
pub use remote::{RedisStore, RedisStoreConfig};

/// A key to [`Entry`] store.
///
/// `get` never returns an entry that is too old: the backend deletes it and
/// reports absence instead. Backend and (de)serialization failures are returned
/// as-is; stores do not retry.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Entry>, Error>;

    async fn set(&self, key: &str, entry: Entry) -> Result<(), Error>;

    async fn delete(&self, key: &str) -> Result<(), Error>;

    async fn clear(&self) -> Result<(), Error>;

    /// Release background work and connections held by the backend.
    async fn close(&self) -> Result<(), Error>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
