//! Markdown normalization with YAML frontmatter.
//!
//! Enforces a consistent header format for cached documents.

use chrono::{DateTime, Utc};
use url::Url;

/// Readable content pulled out of a page.
#[derive(Debug, Clone)]
pub struct ExtractedDoc {
    /// Page title
    pub title: Option<String>,
    /// Markdown content
    pub markdown: String,
    /// Extractor version (e.g., "lectito-core@0.x")
    pub extractor_version: String,
}

/// Normalize extracted content with YAML frontmatter header.
///
/// Frontmatter format:
/// ```yaml
/// ---
/// title: <page title>
/// source: <url>
/// fetched_at: <ISO8601 timestamp>
/// extractor: <extractor version>
/// ---
/// <markdown body>
/// ```
pub fn normalize_markdown(doc: &ExtractedDoc, source_url: &Url, fetched_at: &DateTime<Utc>) -> String {
    let title = doc.title.as_deref().unwrap_or("Untitled");

    format!(
        "---\ntitle: {title}\nsource: {source}\nfetched_at: {timestamp}\nextractor: {extractor}\n---\n{markdown}",
        title = escape_yaml(title),
        source = source_url.as_str(),
        timestamp = fetched_at.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
        extractor = doc.extractor_version,
        markdown = doc.markdown.trim()
    )
}

/// Quote a scalar when it would not survive as a plain YAML value.
fn escape_yaml(s: &str) -> String {
    if s.is_empty() {
        "\"\"".to_string()
    } else if s.contains('\n') || s.contains(": ") || s.starts_with(['"', '\'', '#', '-', '[', '{']) {
        format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        s.to_string()
    }
}
