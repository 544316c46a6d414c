//! Per-origin robots.txt cache with its own TTL and its own soft-failure
//! policy, as required by the policy gate (C2): a fetch failure is retried
//! with backoff and then cached as a soft failure for a short TTL rather
//! than retried on every single request.

use crate::robots::ParsedRobots;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

const FRESH_TTL_HOURS: i64 = 24;
const SOFT_FAIL_TTL_MINUTES: i64 = 10;

/// One origin's cached robots.txt state.
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: ParsedRobots,
    pub fetched_at: DateTime<Utc>,
    /// True if this entry represents a fetch failure cached under the
    /// allow-with-warning fallback, rather than real robots.txt content.
    pub soft_fail: bool,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
            soft_fail: false,
        }
    }

    pub fn soft_failure() -> Self {
        Self {
            content: ParsedRobots::allow_all(),
            fetched_at: Utc::now(),
            soft_fail: true,
        }
    }

    /// Fresh entries expire after 24h; soft-failure entries expire sooner
    /// so a transient fetch error doesn't get cached for a full day.
    pub fn is_stale(&self) -> bool {
        let ttl = if self.soft_fail {
            Duration::minutes(SOFT_FAIL_TTL_MINUTES)
        } else {
            Duration::hours(FRESH_TTL_HOURS)
        };
        Utc::now() - self.fetched_at > ttl
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        self.content.is_allowed(url, user_agent)
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.content.crawl_delay(user_agent)
    }
}

/// A concurrent, per-origin cache of robots.txt state.
#[derive(Debug, Default)]
pub struct RobotsCache {
    entries: DashMap<String, CachedRobots>,
}

impl RobotsCache {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns the cached entry for `origin` if one exists and hasn't expired.
    pub fn get(&self, origin: &str) -> Option<CachedRobots> {
        self.entries
            .get(origin)
            .filter(|entry| !entry.is_stale())
            .map(|entry| entry.clone())
    }

    pub fn insert(&self, origin: impl Into<String>, entry: CachedRobots) {
        self.entries.insert(origin.into(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cache_not_stale() {
        let cache = CachedRobots::new(ParsedRobots::allow_all());
        assert!(!cache.is_stale());
    }

    #[test]
    fn test_cache_is_stale_after_24h() {
        let mut cache = CachedRobots::new(ParsedRobots::allow_all());
        cache.fetched_at = Utc::now() - Duration::hours(25);
        assert!(cache.is_stale());
    }

    #[test]
    fn test_soft_failure_expires_sooner_than_fresh() {
        let mut soft = CachedRobots::soft_failure();
        soft.fetched_at = Utc::now() - Duration::minutes(SOFT_FAIL_TTL_MINUTES + 1);
        assert!(soft.is_stale());

        let mut fresh = CachedRobots::new(ParsedRobots::allow_all());
        fresh.fetched_at = Utc::now() - Duration::minutes(SOFT_FAIL_TTL_MINUTES + 1);
        assert!(!fresh.is_stale());
    }

    #[test]
    fn test_is_allowed_delegates_to_content() {
        let cache = CachedRobots::new(ParsedRobots::allow_all());
        assert!(cache.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_crawl_delay_delegates_to_content() {
        let cache = CachedRobots::new(ParsedRobots::from_content(
            "User-agent: *\nCrawl-delay: 3",
        ));
        assert_eq!(cache.crawl_delay("TestBot"), Some(3.0));
    }

    #[test]
    fn test_robots_cache_roundtrip() {
        let cache = RobotsCache::new();
        assert!(cache.is_empty());
        assert!(cache.get("https://example.com").is_none());
        cache.insert("https://example.com", CachedRobots::new(ParsedRobots::allow_all()));
        assert!(cache.get("https://example.com").is_some());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_robots_cache_expires_stale_entries() {
        let cache = RobotsCache::new();
        let mut entry = CachedRobots::new(ParsedRobots::allow_all());
        entry.fetched_at = Utc::now() - Duration::hours(FRESH_TTL_HOURS + 1);
        cache.insert("https://example.com", entry);
        assert!(cache.get("https://example.com").is_none());
    }
}
