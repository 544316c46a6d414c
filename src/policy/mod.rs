//! The policy gate (C2): decides whether a candidate URL may be fetched.
//!
//! Evaluation order mirrors the design: scheme whitelist, private-IP/loopback
//! check, host allow/deny patterns, robots.txt, depth/page budgets, and
//! finally a homograph/IDN heuristic that only warns.

use crate::config::{Config, RobotsConfig};
use crate::model::RobotsDecision;
use crate::robots::{self, CachedRobots, RobotsCache};
use crate::url::{any_matches, compile_patterns, extract_origin, HostPattern};
use crate::RobotsError;
use std::net::IpAddr;
use std::sync::Arc;
use url::Url;

/// The outcome of a policy evaluation.
#[derive(Debug, Clone)]
pub enum PolicyDecision {
    Allow {
        robots_decision: RobotsDecision,
        /// Non-fatal observations (e.g. a homograph-suspicious host) that
        /// should still be logged as event records.
        warnings: Vec<String>,
    },
    Deny {
        reason: String,
    },
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow { .. })
    }
}

pub struct PolicyGate {
    allow_patterns: Vec<HostPattern>,
    deny_patterns: Vec<HostPattern>,
    robots_config: RobotsConfig,
    robots_cache: RobotsCache,
    max_depth: Option<u32>,
}

impl PolicyGate {
    pub fn new(config: &Config) -> Self {
        let max_depth = if config.max_depth < 0 {
            None
        } else {
            Some(config.max_depth as u32)
        };
        Self {
            allow_patterns: compile_patterns(&config.discovery.allow_urls),
            deny_patterns: compile_patterns(&config.discovery.deny_urls),
            robots_config: config.robots.clone(),
            robots_cache: RobotsCache::new(),
            max_depth,
        }
    }

    /// Evaluates a candidate URL at a given crawl depth.
    pub async fn evaluate(
        &self,
        client: &reqwest::Client,
        user_agent: &str,
        url: &Url,
        depth: u32,
    ) -> PolicyDecision {
        if url.scheme() != "http" && url.scheme() != "https" {
            return PolicyDecision::Deny {
                reason: format!("scheme '{}' not in whitelist", url.scheme()),
            };
        }

        if let Some(host) = url.host_str() {
            if let Ok(ip) = host.parse::<IpAddr>() {
                if is_private_or_loopback(ip) {
                    return PolicyDecision::Deny {
                        reason: format!("host '{}' is a private/loopback address", host),
                    };
                }
            }
        }

        let Some(host) = url.host_str() else {
            return PolicyDecision::Deny {
                reason: "URL has no host".to_string(),
            };
        };

        if !self.deny_patterns.is_empty() && any_matches(&self.deny_patterns, host) {
            return PolicyDecision::Deny {
                reason: format!("host '{}' matched a deny pattern", host),
            };
        }
        if !self.allow_patterns.is_empty() && !any_matches(&self.allow_patterns, host) {
            return PolicyDecision::Deny {
                reason: format!("host '{}' did not match any allow pattern", host),
            };
        }

        if let Some(max_depth) = self.max_depth {
            if depth > max_depth {
                return PolicyDecision::Deny {
                    reason: format!("depth {} exceeds max-depth {}", depth, max_depth),
                };
            }
        }

        let robots_decision = if self.robots_config.respect {
            match self.check_robots(client, user_agent, url).await {
                Ok(true) => RobotsDecision::Allow,
                Ok(false) => {
                    if self.robots_config.override_used {
                        RobotsDecision::Override
                    } else {
                        return PolicyDecision::Deny {
                            reason: format!("disallowed by robots.txt: {}", url),
                        };
                    }
                }
                Err(_) => RobotsDecision::Unknown,
            }
        } else {
            RobotsDecision::Allow
        };

        let mut warnings = Vec::new();
        if looks_like_homograph(host) {
            warnings.push(format!("host '{}' uses mixed-script/IDN encoding", host));
        }

        PolicyDecision::Allow {
            robots_decision,
            warnings,
        }
    }

    /// Returns `Ok(true)` if allowed, `Ok(false)` if disallowed, `Err` if
    /// robots.txt could not be determined (caller falls back to
    /// allow-with-warning per the configured policy).
    async fn check_robots(
        &self,
        client: &reqwest::Client,
        user_agent: &str,
        url: &Url,
    ) -> Result<bool, RobotsError> {
        let Some(origin) = extract_origin(url) else {
            return Ok(true);
        };

        let cached = self.robots_cache.get(&origin);
        let entry = if let Some(entry) = cached {
            entry
        } else {
            match robots::fetch_robots(client, &origin, user_agent).await {
                Ok(parsed) => {
                    let entry = CachedRobots::new(parsed);
                    self.robots_cache.insert(origin.clone(), entry.clone());
                    entry
                }
                Err(e) => {
                    self.robots_cache
                        .insert(origin.clone(), CachedRobots::soft_failure());
                    return Err(e);
                }
            }
        };

        let path = path_and_query(url);
        Ok(entry.is_allowed(&path, user_agent))
    }

    pub fn robots_cache(&self) -> &RobotsCache {
        &self.robots_cache
    }
}

fn path_and_query(url: &Url) -> String {
    match url.query() {
        Some(q) => format!("{}?{}", url.path(), q),
        None => url.path().to_string(),
    }
}

fn is_private_or_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// A coarse homograph heuristic: any IDN-encoded label (`xn--...`) is
/// flagged for a human to review; this never denies on its own.
fn looks_like_homograph(host: &str) -> bool {
    host.split('.').any(|label| label.starts_with("xn--"))
}

pub type SharedPolicyGate = Arc<PolicyGate>;
