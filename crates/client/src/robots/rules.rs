//! robots.txt parsing and longest-match path resolution.
//!
//! Only two groups are kept while parsing: `*` and the group whose agent token
//! appears (case-insensitively) anywhere in our user agent. If the latter was
//! seen at all it replaces the wildcard group outright; the two are never merged.
//!
//! Agent matching is a substring test, looser than the token/prefix match most
//! robots implementations use. A group named `bot` therefore applies to
//! `kindly-bot/1.0`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Parsed rules for one host. Immutable; a refresh replaces the whole value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlRules {
    pub disallow: Vec<String>,
    pub allow: Vec<String>,
    /// Whole seconds; 0 means no delay was declared.
    pub crawl_delay_secs: u64,
}

#[derive(Default)]
struct Group {
    disallow: Vec<String>,
    allow: Vec<String>,
    crawl_delay: Option<u64>,
}

impl Group {
    fn into_rules(self) -> CrawlRules {
        CrawlRules { disallow: self.disallow, allow: self.allow, crawl_delay_secs: self.crawl_delay.unwrap_or(0) }
    }
}

#[derive(Clone, Copy)]
enum Target {
    None,
    Wildcard,
    Specific,
}

impl CrawlRules {
    /// No restrictions and no delay, used when a host has no robots.txt.
    pub fn allow_all() -> Self {
        Self::default()
    }

    pub fn crawl_delay(&self) -> Duration {
        Duration::from_secs(self.crawl_delay_secs)
    }

    /// Parse robots.txt text for the given user agent.
    pub fn parse(text: &str, user_agent: &str) -> Self {
        let agent = user_agent.to_lowercase();
        let mut wildcard = Group::default();
        let mut specific = Group::default();
        let mut specific_seen = false;
        let mut target = Target::None;

        for raw in text.lines() {
            let line = strip_comment(raw).trim();
            if line.is_empty() {
                continue;
            }
            let Some((directive, value)) = line.split_once(':') else {
                continue;
            };
            let directive = directive.trim().to_ascii_lowercase();
            let value = value.trim();

            if directive == "user-agent" {
                let token = value.to_lowercase();
                target = if token == "*" {
                    Target::Wildcard
                } else if !token.is_empty() && agent.contains(&token) {
                    specific_seen = true;
                    Target::Specific
                } else {
                    Target::None
                };
                continue;
            }

            let group = match target {
                Target::None => continue,
                Target::Wildcard => &mut wildcard,
                Target::Specific => &mut specific,
            };

            match directive.as_str() {
                "disallow" if !value.is_empty() => group.disallow.push(value.to_string()),
                "allow" if !value.is_empty() => group.allow.push(value.to_string()),
                "crawl-delay" if group.crawl_delay.is_none() => {
                    if let Some(secs) = parse_delay(value) {
                        group.crawl_delay = Some(secs);
                    }
                }
                _ => {}
            }
        }

        if specific_seen { specific.into_rules() } else { wildcard.into_rules() }
    }

    /// Whether `path` may be fetched.
    ///
    /// The longest matching pattern decides; on a length tie `Allow` wins; a
    /// path no pattern matches is allowed.
    pub fn is_allowed(&self, path: &str) -> bool {
        let longest = |patterns: &[String]| {
            patterns
                .iter()
                .filter(|p| pattern_matches(p, path))
                .map(|p| p.chars().count())
                .max()
        };

        match (longest(&self.allow), longest(&self.disallow)) {
            (_, None) => true,
            (None, Some(_)) => false,
            (Some(allow), Some(disallow)) => allow >= disallow,
        }
    }
}

/// Cut a trailing comment. A `#` only starts a comment at the beginning of
/// the line or after whitespace, so `#` inside a rule value is kept.
fn strip_comment(line: &str) -> &str {
    line.char_indices()
        .find(|&(i, c)| c == '#' && line[..i].chars().next_back().is_none_or(char::is_whitespace))
        .map_or(line, |(i, _)| &line[..i])
}

/// Upper bound on a site-declared crawl delay (one day).
pub const MAX_CRAWL_DELAY_SECS: u64 = 24 * 60 * 60;

/// Whole seconds capped at [`MAX_CRAWL_DELAY_SECS`]; fractional values are
/// truncated, anything else is ignored.
fn parse_delay(value: &str) -> Option<u64> {
    let secs = match value.parse::<u64>() {
        Ok(secs) => secs,
        Err(_) => value
            .parse::<f64>()
            .ok()
            .filter(|secs| secs.is_finite() && *secs >= 0.0)
            .map(|secs| secs.min(MAX_CRAWL_DELAY_SECS as f64).trunc() as u64)?,
    };
    Some(secs.min(MAX_CRAWL_DELAY_SECS))
}

/// Match one robots pattern against a path.
///
/// - `/` matches everything
/// - a trailing `$` requires the rest of the pattern to equal the whole path
/// - `*` matches any run of characters
/// - anything else is a prefix match
pub fn pattern_matches(pattern: &str, path: &str) -> bool {
    if pattern == "/" {
        return true;
    }
    if let Some(exact) = pattern.strip_suffix('$') {
        return path == exact;
    }
    if !pattern.contains('*') {
        return path.starts_with(pattern);
    }

    // At least two segments: the pattern contains a `*`.
    let segments: Vec<&str> = pattern.split('*').collect();
    let first = segments[0];
    let last = segments[segments.len() - 1];
    let interior = &segments[1..segments.len() - 1];

    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    for segment in interior.iter().filter(|s| !s.is_empty()) {
        match path[pos..].find(segment) {
            Some(offset) => pos += offset + segment.len(),
            None => return false,
        }
    }

    last.is_empty() || (path.len() - pos >= last.len() && path.ends_with(last))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UA: &str = "kindly-bot/0.1";

    #[test]
    fn test_longest_match_allow_inside_disallow() {
        let rules = CrawlRules::parse("User-agent: *\nDisallow: /private/\nAllow: /private/public/\n", UA);
        assert!(rules.is_allowed("/private/public/x.html"));
        assert!(!rules.is_allowed("/private/secret.html"));
        assert!(rules.is_allowed("/docs/x.html"));
    }

    #[test]
    fn test_longest_match_disallow_inside_allow() {
        let rules = CrawlRules::parse("User-agent: *\nAllow: /shop/\nDisallow: /shop/cart\n", UA);
        assert!(rules.is_allowed("/shop/shoes"));
        assert!(!rules.is_allowed("/shop/cart/checkout"));
    }

    #[test]
    fn test_tie_prefers_allow() {
        let rules = CrawlRules { disallow: vec!["/page".into()], allow: vec!["/page".into()], crawl_delay_secs: 0 };
        assert!(rules.is_allowed("/page"));
    }

    #[test]
    fn test_specific_agent_replaces_wildcard() {
        let text = "User-agent: *\nDisallow: /\n\nUser-agent: kindly\nDisallow: /admin\nCrawl-delay: 3\n";
        let rules = CrawlRules::parse(text, UA);
        assert_eq!(rules.disallow, vec!["/admin".to_string()]);
        assert!(rules.is_allowed("/docs"));
        assert!(!rules.is_allowed("/admin/users"));
        assert_eq!(rules.crawl_delay(), Duration::from_secs(3));
    }

    #[test]
    fn test_agent_match_is_case_insensitive_substring() {
        let rules = CrawlRules::parse("User-agent: BOT\nDisallow: /x\n", "Kindly-Bot/2.0");
        assert_eq!(rules.disallow, vec!["/x".to_string()]);
    }

    #[test]
    fn test_unrelated_agent_is_ignored() {
        let text = "User-agent: googlebot\nDisallow: /\n\nUser-agent: *\nDisallow: /tmp\n";
        let rules = CrawlRules::parse(text, UA);
        assert_eq!(rules.disallow, vec!["/tmp".to_string()]);
        assert!(rules.is_allowed("/"));
    }

    #[test]
    fn test_comments_blank_lines_and_case() {
        let text = "# site rules\n\nUSER-AGENT: *   # everyone\nDISALLOW: /cgi-bin/ # scripts\n\nnot a directive\n";
        let rules = CrawlRules::parse(text, UA);
        assert_eq!(rules.disallow, vec!["/cgi-bin/".to_string()]);
    }

    #[test]
    fn test_hash_inside_value_is_kept() {
        let text = "User-agent: *\nDisallow: /page#section\nDisallow: /tmp\t# scratch\n#Disallow: /\n";
        let rules = CrawlRules::parse(text, UA);
        assert_eq!(rules.disallow, vec!["/page#section".to_string(), "/tmp".to_string()]);
    }

    #[test]
    fn test_empty_disallow_allows_everything() {
        let rules = CrawlRules::parse("User-agent: *\nDisallow:\n", UA);
        assert!(rules.disallow.is_empty());
        assert!(rules.is_allowed("/anything"));
    }

    #[test]
    fn test_first_crawl_delay_wins() {
        let rules = CrawlRules::parse("User-agent: *\nCrawl-delay: 5\nCrawl-delay: 9\n", UA);
        assert_eq!(rules.crawl_delay_secs, 5);

        let rules = CrawlRules::parse("User-agent: *\nCrawl-delay: 2.7\n", UA);
        assert_eq!(rules.crawl_delay_secs, 2);

        let rules = CrawlRules::parse("User-agent: *\nCrawl-delay: soon\nCrawl-delay: 4\n", UA);
        assert_eq!(rules.crawl_delay_secs, 4);
    }

    #[test]
    fn test_huge_crawl_delay_is_capped() {
        let rules = CrawlRules::parse("User-agent: *\nCrawl-delay: 99999999999999999999\n", UA);
        assert_eq!(rules.crawl_delay_secs, MAX_CRAWL_DELAY_SECS);

        let rules = CrawlRules::parse("User-agent: *\nCrawl-delay: 1e300\n", UA);
        assert_eq!(rules.crawl_delay_secs, MAX_CRAWL_DELAY_SECS);

        let rules = CrawlRules::parse("User-agent: *\nCrawl-delay: 86401\n", UA);
        assert_eq!(rules.crawl_delay(), Duration::from_secs(MAX_CRAWL_DELAY_SECS));
    }

    #[test]
    fn test_rules_before_any_user_agent_are_ignored() {
        let rules = CrawlRules::parse("Disallow: /\nUser-agent: *\nAllow: /\n", UA);
        assert!(rules.disallow.is_empty());
        assert!(rules.is_allowed("/x"));
    }

    #[test]
    fn test_empty_text_allows_all() {
        let rules = CrawlRules::parse("", UA);
        assert_eq!(rules, CrawlRules::allow_all());
        assert!(rules.is_allowed("/"));
    }

    #[test]
    fn test_pattern_root_matches_everything() {
        assert!(pattern_matches("/", "/"));
        assert!(pattern_matches("/", "/deep/path?q=1"));
    }

    #[test]
    fn test_pattern_dollar_is_exact() {
        assert!(pattern_matches("/index.html$", "/index.html"));
        assert!(!pattern_matches("/index.html$", "/index.html?x=1"));
        assert!(!pattern_matches("/index.html$", "/index"));
    }

    #[test]
    fn test_pattern_prefix() {
        assert!(pattern_matches("/private", "/private/area"));
        assert!(pattern_matches("/private", "/privateer"));
        assert!(!pattern_matches("/private", "/public"));
    }

    #[test]
    fn test_pattern_wildcards() {
        assert!(pattern_matches("/*.pdf", "/docs/report.pdf"));
        assert!(!pattern_matches("/*.pdf", "/docs/report.pdf.html"));
        assert!(pattern_matches("/a/*/c/*", "/a/b/c/d"));
        assert!(pattern_matches("/a/*/c/*", "/a/b/c/"));
        assert!(!pattern_matches("/a/*/c/*", "/a/b/d"));
        assert!(pattern_matches("/*?session=*", "/page?session=abc"));
        assert!(pattern_matches("/**/x", "/y/x"));
        assert!(!pattern_matches("/ab*ab", "/ab"));
        assert!(pattern_matches("*", "/anything"));
    }

    #[test]
    fn test_wildcard_rule_in_rules() {
        let rules = CrawlRules::parse("User-agent: *\nDisallow: /*.json\nAllow: /api/public/*.json\n", UA);
        assert!(!rules.is_allowed("/data/list.json"));
        assert!(rules.is_allowed("/api/public/list.json"));
        assert!(rules.is_allowed("/data/list.html"));
    }
}
