//! Core types and shared functionality for kindly.
//!
//! This crate provides:
//! - Cached entry type and its freshness state machine
//! - The `Store` trait with in-memory (LRU) and Redis backends
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{Entry, Freshness, MemoryStore, MemoryStoreConfig, RedisStore, RedisStoreConfig, Store};
pub use config::AppConfig;
pub use error::Error;
