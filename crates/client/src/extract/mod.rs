//! Body normalization keyed by media type.
//!
//! ### Registry
//! - `NormalizerRegistry` maps a media-type essence (`text/html`, no parameters) to a
//!   `Normalizer` trait object.
//! - The URL of the document is passed to every call; normalizers hold no per-request state.
//!
//! ### Readable HTML
//! - `ReadableHtml` uses Lectito's extraction pipeline (Readability.js-inspired):
//!   preprocessing, scoring, best-candidate selection, and cleanup.
//! - Output is Markdown with a consistent YAML header: `title`, `source`, `fetched_at`, `extractor`.
//!
//! ### Metadata
//! - `PageMetadata` pulls title and description out of raw HTML with `scraper`.

pub mod metadata;
pub mod normalize;

pub use metadata::PageMetadata;
pub use normalize::{ExtractedDoc, normalize_markdown};

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use kindly_core::Error;
use lectito_core::{Document, ExtractConfig as LectitoConfig};
use url::Url;

/// Media types handled by [`ReadableHtml`].
pub const HTML_MEDIA_TYPES: [&str; 2] = ["text/html", "application/xhtml+xml"];

/// Lower-cased media type without parameters: `Text/HTML; charset=utf-8` -> `text/html`.
pub fn media_type_essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
}

pub fn is_html(content_type: &str) -> bool {
    HTML_MEDIA_TYPES.contains(&media_type_essence(content_type).as_str())
}

/// Transforms a fetched body before it is cached.
pub trait Normalizer: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Normalize `body`, which was fetched from `url`.
    fn normalize(&self, url: &Url, body: &[u8]) -> Result<Vec<u8>, Error>;
}

/// Normalizers keyed by media type.
#[derive(Clone, Default)]
pub struct NormalizerRegistry {
    handlers: HashMap<String, Arc<dyn Normalizer>>,
}

impl NormalizerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with [`ReadableHtml`] for every HTML media type.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let readable: Arc<dyn Normalizer> = Arc::new(ReadableHtml::default());
        for media_type in HTML_MEDIA_TYPES {
            registry.register(media_type, Arc::clone(&readable));
        }
        registry
    }

    /// Register `handler` for a media type, replacing any previous one.
    pub fn register(&mut self, media_type: &str, handler: Arc<dyn Normalizer>) {
        self.handlers.insert(media_type_essence(media_type), handler);
    }

    pub fn has_handler(&self, content_type: &str) -> bool {
        self.handlers.contains_key(&media_type_essence(content_type))
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Run the handler registered for `content_type`, if any.
    ///
    /// Returns `Ok(None)` when no handler is registered.
    pub fn normalize(&self, url: &Url, content_type: &str, body: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        let Some(handler) = self.handlers.get(&media_type_essence(content_type)) else {
            return Ok(None);
        };
        tracing::debug!(%url, normalizer = handler.name(), bytes = body.len(), "normalizing body");
        handler.normalize(url, body).map(Some)
    }
}

impl std::fmt::Debug for NormalizerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut types: Vec<_> = self.handlers.keys().collect();
        types.sort();
        f.debug_struct("NormalizerRegistry").field("media_types", &types).finish()
    }
}

/// Configuration for readable content extraction.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    /// Minimum character count for content (default: 200)
    pub char_threshold: Option<usize>,

    /// Maximum number of top candidates to consider (default: 5)
    pub max_top_candidates: Option<usize>,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self { char_threshold: Some(200), max_top_candidates: Some(5) }
    }
}

impl ExtractConfig {
    /// Convert to Lectito's config type.
    fn to_lectito_config(&self) -> LectitoConfig {
        let mut cfg = LectitoConfig::default();
        if let Some(threshold) = self.char_threshold {
            cfg.char_threshold = threshold;
        }
        if let Some(max) = self.max_top_candidates {
            cfg.max_top_candidates = max;
        }
        cfg
    }
}

/// Lectito-based HTML to Markdown normalizer.
#[derive(Debug, Clone)]
pub struct ReadableHtml {
    config: ExtractConfig,
    version: &'static str,
}

impl ReadableHtml {
    pub fn new(config: ExtractConfig) -> Self {
        Self { config, version: "lectito-core@0.2.0" }
    }

    /// Extract the readable part of `html` as Markdown.
    pub fn extract(&self, html: &str) -> Result<ExtractedDoc, Error> {
        let doc =
            Document::parse(html).map_err(|e| Error::NormalizeFailed(format!("failed to parse HTML: {}", e)))?;

        let extracted = lectito_core::extract_content(&doc, &self.config.to_lectito_config())
            .map_err(|e| Error::NormalizeFailed(format!("extraction failed: {}", e)))?;

        let metadata = doc.extract_metadata();

        let markdown = lectito_core::convert_to_markdown(&extracted.content, &metadata, &Default::default())
            .map_err(|e| Error::NormalizeFailed(format!("markdown conversion failed: {}", e)))?;

        Ok(ExtractedDoc { title: metadata.title.clone(), markdown, extractor_version: self.version.to_string() })
    }
}

impl Default for ReadableHtml {
    fn default() -> Self {
        Self::new(ExtractConfig::default())
    }
}

impl Normalizer for ReadableHtml {
    fn name(&self) -> &'static str {
        "readable-html"
    }

    fn normalize(&self, url: &Url, body: &[u8]) -> Result<Vec<u8>, Error> {
        let html = String::from_utf8_lossy(body);
        let doc = self.extract(&html)?;
        Ok(normalize_markdown(&doc, url, &Utc::now()).into_bytes())
    }
}
