//! Title and description harvesting from HTML documents.

use scraper::{Html, Selector};

/// Page-level metadata stored alongside a cached body.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PageMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl PageMetadata {
    /// Extract metadata from an HTML document.
    ///
    /// The title comes from `<title>`, falling back to `og:title` and then the
    /// first `<h1>`. The description comes from `<meta name="description">`,
    /// falling back to `og:description`. Blank values count as absent.
    pub fn from_html(html: &str) -> Self {
        let document = Html::parse_document(html);

        let title = first_text(&document, "title")
            .or_else(|| meta_content(&document, r#"meta[property="og:title"]"#))
            .or_else(|| first_text(&document, "h1"));

        let description = meta_content(&document, r#"meta[name="description"]"#)
            .or_else(|| meta_content(&document, r#"meta[property="og:description"]"#));

        Self { title, description }
    }
}

fn first_text(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).expect("invalid selector");
    document
        .select(&selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<Vec<_>>().join(" ")))
        .filter(|text| !text.is_empty())
}

fn meta_content(document: &Html, selector: &str) -> Option<String> {
    let selector = Selector::parse(selector).expect("invalid selector");
    document
        .select(&selector)
        .filter_map(|element| element.value().attr("content"))
        .map(collapse_whitespace)
        .find(|content| !content.is_empty())
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
