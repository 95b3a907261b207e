//! Cache key namespacing.
//!
//! Several logical caches share one backend; each gets its own string prefix.

use sha2::{Digest, Sha256};

/// Prefix for fetched pages.
pub const PAGE_PREFIX: &str = "page:";

/// Prefix for parsed robots.txt rules.
pub const ROBOTS_PREFIX: &str = "robots:";

/// Key for a page, given its canonical URL.
pub fn page_key(canonical_url: &str) -> String {
    format!("{PAGE_PREFIX}{canonical_url}")
}

/// Key for a host's robots rules, given its origin (`scheme://host[:port]`).
pub fn robots_key(origin: &str) -> String {
    format!("{ROBOTS_PREFIX}{origin}")
}

/// Remote backend key: `prefix + key`, or a hashed form when that would exceed `max_len` bytes.
///
/// Hashed keys keep the namespace prefix of `key` so prefix scans still find them.
pub fn remote_key(prefix: &str, key: &str, max_len: usize) -> String {
    if prefix.len() + key.len() <= max_len {
        return format!("{prefix}{key}");
    }

    let namespace = [PAGE_PREFIX, ROBOTS_PREFIX]
        .into_iter()
        .find(|ns| key.starts_with(ns))
        .unwrap_or("");

    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{prefix}{namespace}sha256:{}", hex::encode(hasher.finalize()))
}
