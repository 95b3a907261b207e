//! Cached fetch results and their freshness state machine.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Age-based classification of an [`Entry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// age < ttl
    Fresh,
    /// ttl <= age < ttl + stale_window
    Stale,
    /// age >= ttl + stale_window
    TooOld,
}

/// One cached fetch result.
///
/// Entries are values: a refresh builds a new `Entry` rather than mutating one
/// that other readers may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub url: String,
    pub status: u16,
    /// Lower-cased header name to every value received for it.
    #[serde(default)]
    pub headers: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub body: Vec<u8>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Revalidation token sent back on conditional requests.
    #[serde(default)]
    pub validator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub ttl: Duration,
    pub stale_window: Duration,
}

impl Entry {
    /// Create an entry stamped with the current time.
    pub fn new(url: impl Into<String>, status: u16, body: Vec<u8>, ttl: Duration, stale_window: Duration) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body,
            title: None,
            description: None,
            validator: None,
            created_at: Utc::now(),
            ttl,
            stale_window,
        }
    }

    /// Classify the entry at `now`.
    ///
    /// Age is sampled once so the two threshold comparisons agree with each other.
    /// Timestamps in the future count as age zero.
    pub fn state_at(&self, now: DateTime<Utc>) -> Freshness {
        let age = (now - self.created_at).to_std().unwrap_or(Duration::ZERO);
        if age < self.ttl {
            Freshness::Fresh
        } else if age < self.expires_after() {
            Freshness::Stale
        } else {
            Freshness::TooOld
        }
    }

    pub fn state(&self) -> Freshness {
        self.state_at(Utc::now())
    }

    /// Total lifetime: after this the entry is never served.
    pub fn expires_after(&self) -> Duration {
        self.ttl.saturating_add(self.stale_window)
    }

    /// Copy of this entry with only the creation timestamp moved to `now`.
    pub fn touched(&self, now: DateTime<Utc>) -> Self {
        Self { created_at: now, ..self.clone() }
    }

    /// First value of a header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .get(&name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn entry_aged(ttl: u64, stale: u64, age_ms: i64, now: DateTime<Utc>) -> Entry {
        let mut entry = Entry::new(
            "https://example.com/",
            200,
            b"hello".to_vec(),
            Duration::from_secs(ttl),
            Duration::from_secs(stale),
        );
        entry.created_at = now - TimeDelta::milliseconds(age_ms);
        entry
    }

    #[test]
    fn test_state_thresholds() {
        let now = Utc::now();
        assert_eq!(entry_aged(10, 5, 0, now).state_at(now), Freshness::Fresh);
        assert_eq!(entry_aged(10, 5, 9_999, now).state_at(now), Freshness::Fresh);
        assert_eq!(entry_aged(10, 5, 10_000, now).state_at(now), Freshness::Stale);
        assert_eq!(entry_aged(10, 5, 14_999, now).state_at(now), Freshness::Stale);
        assert_eq!(entry_aged(10, 5, 15_000, now).state_at(now), Freshness::TooOld);
        assert_eq!(entry_aged(10, 5, 90_000, now).state_at(now), Freshness::TooOld);
    }

    #[test]
    fn test_state_grid() {
        let now = Utc::now();
        for ttl in [0u64, 1, 7, 60] {
            for stale in [0u64, 1, 30] {
                for age_s in [0i64, 1, 6, 7, 8, 37, 60, 61, 90, 1000] {
                    let entry = entry_aged(ttl, stale, age_s * 1000, now);
                    let age = age_s as u64;
                    let expected = if age < ttl {
                        Freshness::Fresh
                    } else if age < ttl + stale {
                        Freshness::Stale
                    } else {
                        Freshness::TooOld
                    };
                    assert_eq!(entry.state_at(now), expected, "ttl={ttl} stale={stale} age={age}");
                }
            }
        }
    }

    #[test]
    fn test_zero_stale_window_skips_stale() {
        let now = Utc::now();
        assert_eq!(entry_aged(10, 0, 10_000, now).state_at(now), Freshness::TooOld);
    }

    #[test]
    fn test_future_timestamp_is_fresh() {
        let now = Utc::now();
        let entry = entry_aged(10, 5, -5_000, now);
        assert_eq!(entry.state_at(now), Freshness::Fresh);
    }

    #[test]
    fn test_touched_only_moves_timestamp() {
        let now = Utc::now();
        let mut old = entry_aged(10, 5, 12_000, now);
        old.title = Some("Title".into());
        old.validator = Some("Wed, 21 Oct 2015 07:28:00 GMT".into());
        assert_eq!(old.state_at(now), Freshness::Stale);

        let refreshed = old.touched(now);
        assert_eq!(refreshed.state_at(now), Freshness::Fresh);
        assert_eq!(refreshed.body, old.body);
        assert_eq!(refreshed.title, old.title);
        assert_eq!(refreshed.validator, old.validator);
        assert_eq!(refreshed.created_at, now);
    }

    #[test]
    fn test_header_lookup_case_insensitive() {
        let mut entry = Entry::new("https://example.com/", 200, Vec::new(), Duration::ZERO, Duration::ZERO);
        entry
            .headers
            .insert("content-type".into(), vec!["text/html; charset=utf-8".into()]);
        assert_eq!(entry.content_type(), Some("text/html; charset=utf-8"));
        assert_eq!(entry.header("Content-Type"), Some("text/html; charset=utf-8"));
        assert_eq!(entry.header("etag"), None);
    }
}
