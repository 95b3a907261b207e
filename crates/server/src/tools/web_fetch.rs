//! web_fetch tool implementation.
//!
//! Serves a URL through the cache manager: fresh entries come straight from the
//! cache, stale ones are returned while they refresh in the background, and
//! misses are fetched politely (robots.txt, per-host pacing) and cached.

use kindly_client::CacheManager;
use kindly_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::{PageOutput, json_result};

/// Input parameters for web_fetch tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WebFetchParams {
    /// The URL to fetch. A missing scheme defaults to https.
    pub url: String,
}

/// Implementation of the web_fetch tool.
pub async fn fetch_impl(manager: &CacheManager, params: WebFetchParams) -> Result<CallToolResult, McpError> {
    if params.url.trim().is_empty() {
        return Err(Error::InvalidInput("url cannot be empty".into()).into());
    }

    let response = manager.fetch(&params.url).await?;
    tracing::info!(url = %response.entry.url, cache = response.state.as_str(), "web_fetch");

    Ok(json_result(&PageOutput::from(response))?)
}
