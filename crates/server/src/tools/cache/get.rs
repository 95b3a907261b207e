//! cache_get tool implementation.
//!
//! Returns the cached page for a URL without any network access.

use kindly_client::CacheManager;
use kindly_core::Error;
use rmcp::{ErrorData as McpError, model::CallToolResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::tools::{PageOutput, json_result};

/// Parameters for the cache_get tool.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CacheGetParams {
    /// The URL whose cached page should be returned.
    pub url: String,
}

/// Implementation of the cache_get tool.
pub async fn get_impl(manager: &CacheManager, params: CacheGetParams) -> Result<CallToolResult, McpError> {
    let response = manager
        .peek(&params.url)
        .await?
        .ok_or_else(|| Error::CacheMiss(params.url.clone()))?;

    Ok(json_result(&PageOutput::from(response))?)
}
