//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::{AppConfig, CacheBackend};
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `requests_per_second` is set but not positive
    /// - `cache.max_entries` or `cache.sweep_interval_secs` is 0
    ///
    /// Returns `ConfigError::Missing` if the redis backend is selected without a URL.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if let Some(rps) = self.requests_per_second
            && !(rps > 0.0 && rps.is_finite())
        {
            return Err(ConfigError::Invalid {
                field: "requests_per_second".into(),
                reason: "must be a positive number".into(),
            });
        }

        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.max_entries".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.sweep_interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if self.cache.backend == CacheBackend::Redis && self.cache.redis_url.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "cache.redis_url".into(),
                hint: "Set KINDLY_CACHE__REDIS_URL environment variable".into(),
            });
        }

        if self.page_ttl_secs == 0 && self.stale_window_secs == 0 {
            tracing::warn!("page_ttl_secs and stale_window_secs are both 0; every fetch will miss the cache");
        }

        Ok(())
    }
}
