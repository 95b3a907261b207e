//! MCP tool implementations.
//!
//! This module contains all tools exposed by the kindly server.

pub mod cache;
pub mod web_fetch;

pub use web_fetch::{WebFetchParams, fetch_impl};

use kindly_client::CachedResponse;
use kindly_core::Error;
use rmcp::model::{CallToolResult, Content};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A cached page as returned by `web_fetch` and `cache_get`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct PageOutput {
    /// The URL the content was fetched from (after redirects).
    pub url: String,
    /// How the response was served: "hit", "stale" or "miss".
    pub cache: String,
    /// HTTP status code of the cached response.
    pub status: u16,
    /// Content-Type header of the original response.
    pub content_type: Option<String>,
    /// Page title, if the document was HTML.
    pub title: Option<String>,
    /// Page description, if the document was HTML.
    pub description: Option<String>,
    /// ISO8601 timestamp of when the content was fetched or last revalidated.
    pub fetched_at: String,
    /// Seconds the entry is served fresh after `fetched_at`.
    pub ttl_secs: u64,
    /// Document body; HTML is converted to Markdown.
    pub content: String,
}

impl From<CachedResponse> for PageOutput {
    fn from(response: CachedResponse) -> Self {
        let CachedResponse { entry, state } = response;
        Self {
            content_type: entry.content_type().map(str::to_string),
            cache: state.as_str().to_string(),
            status: entry.status,
            title: entry.title,
            description: entry.description,
            fetched_at: entry
                .created_at
                .to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            ttl_secs: entry.ttl.as_secs(),
            content: String::from_utf8_lossy(&entry.body).into_owned(),
            url: entry.url,
        }
    }
}

/// Serialize a tool output as pretty JSON text content.
pub(crate) fn json_result<T: Serialize>(output: &T) -> Result<CallToolResult, Error> {
    let json = serde_json::to_string_pretty(output)
        .map_err(|e| Error::InvalidInput(format!("Failed to serialize output: {e}")))?;
    Ok(CallToolResult::success(vec![Content::text(json)]))
}
