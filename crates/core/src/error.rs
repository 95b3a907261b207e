//! Unified error types for kindly.
//!
//! Every variant carries a stable code prefix in its message so log lines and
//! MCP error payloads stay greppable.

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error type shared by the stores, the fetch pipeline and the server.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty URL).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No cache entry found for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Cache backend I/O failed.
    #[error("CACHE_ERROR: {0}")]
    CacheBackend(String),

    /// A cached payload could not be encoded or decoded.
    #[error("CACHE_ERROR: serialization failed: {0}")]
    Serialization(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Robots.txt disallowed access.
    #[error("ROBOTS_DISALLOWED: {0}")]
    RobotsDisallowed(String),

    /// Fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Fetch response too large.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// HTTP error response or transport failure.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// A content normalizer rejected the body.
    #[error("NORMALIZE_FAILED: {0}")]
    NormalizeFailed(String),

    /// The cache manager has been shut down.
    #[error("SHUTDOWN")]
    Shutdown,
}

impl Error {
    /// Whether this error came from a cache backend rather than the network.
    pub fn is_cache_error(&self) -> bool {
        matches!(self, Error::CacheBackend(_) | Error::Serialization(_))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::CacheBackend(format!("redis: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::CacheBackend(msg) => (-32002, msg.clone()),
            Error::Serialization(msg) => (-32002, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::RobotsDisallowed(msg) => (-32005, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::HttpError(msg) => (-32008, msg.clone()),
            Error::NormalizeFailed(msg) => (-32000, msg.clone()),
            Error::Shutdown => (-32013, "Cache manager is shut down".to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
