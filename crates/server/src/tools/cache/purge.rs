//! cache_purge tool implementation.
//!
//! Invalidates one URL or clears the whole cache.

use kindly_client::CacheManager;
use kindly_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::json_result;

/// Parameters for the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeParams {
    /// Invalidate the cached page for this URL.
    #[serde(default)]
    pub url: Option<String>,

    /// Clear every cached page and robots.txt rule.
    #[serde(default)]
    pub all: bool,
}

/// Output from the cache_purge tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CachePurgeOutput {
    /// What was purged: the URL, or "all".
    pub purged: String,
}

/// Implementation of the cache_purge tool.
pub async fn purge_impl(manager: &CacheManager, params: CachePurgeParams) -> Result<CallToolResult, McpError> {
    let purged = match (params.all, params.url) {
        (true, _) => {
            manager.clear().await?;
            "all".to_string()
        }
        (false, Some(url)) if !url.trim().is_empty() => {
            manager.invalidate(&url).await?;
            url
        }
        _ => {
            return Err(Error::InvalidInput("Either url or all=true must be specified".to_string()).into());
        }
    };

    Ok(json_result(&CachePurgeOutput { purged })?)
}
