//! Robots.txt parsing: permission checks via the `robotstxt` crate, plus a
//! manual crawl-delay scan (the crate itself doesn't expose the directive).

use robotstxt::DefaultMatcher;

/// Parsed robots.txt data: a thin wrapper exposing permission checks and
/// crawl-delay lookups over the raw content.
#[derive(Debug, Clone)]
pub struct ParsedRobots {
    content: String,
    allow_all: bool,
}

impl ParsedRobots {
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
            allow_all: false,
        }
    }

    /// A permissive instance used when robots.txt cannot be fetched and the
    /// configured fallback policy is allow-with-warning.
    pub fn allow_all() -> Self {
        Self {
            content: String::new(),
            allow_all: true,
        }
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if self.allow_all || self.content.is_empty() {
            return true;
        }
        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, user_agent, url)
    }

    /// Returns the crawl-delay, in seconds, that applies to `user_agent`.
    ///
    /// A directive under a block naming `user_agent` specifically takes
    /// precedence over one under the wildcard (`*`) block.
    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        if self.allow_all || self.content.is_empty() {
            return None;
        }
        let groups = parse_groups(&self.content);
        let ua_lower = user_agent.to_lowercase();

        let mut specific: Option<f64> = None;
        let mut wildcard: Option<f64> = None;
        for (agents, delay) in groups {
            let Some(delay) = delay else { continue };
            if agents.iter().any(|a| a == "*") {
                wildcard = Some(delay);
            }
            if agents
                .iter()
                .any(|a| a != "*" && (ua_lower.contains(a.as_str()) || a.contains(ua_lower.as_str())))
            {
                specific = Some(delay);
            }
        }
        specific.or(wildcard)
    }
}

/// Scans robots.txt content into `(user-agent group, crawl-delay)` pairs.
///
/// Groups are delimited the way the spec requires: consecutive
/// `User-agent:` lines accumulate into one group's agent list; the first
/// non-`User-agent` directive seen afterward closes the agent list (further
/// `User-agent:` lines start a new group).
fn parse_groups(content: &str) -> Vec<(Vec<String>, Option<f64>)> {
    let mut groups = Vec::new();
    let mut current_agents: Vec<String> = Vec::new();
    let mut current_delay: Option<f64> = None;
    let mut group_has_directive = false;

    for raw_line in content.lines() {
        let line = raw_line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let field = field.trim().to_lowercase();
        let value = value.trim();

        match field.as_str() {
            "user-agent" => {
                if group_has_directive {
                    groups.push((std::mem::take(&mut current_agents), current_delay.take()));
                    group_has_directive = false;
                }
                current_agents.push(value.to_lowercase());
            }
            "crawl-delay" => {
                if let Ok(v) = value.parse::<f64>() {
                    current_delay = Some(v);
                }
                group_has_directive = true;
            }
            _ => {
                group_has_directive = true;
            }
        }
    }
    if !current_agents.is_empty() {
        groups.push((current_agents, current_delay));
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("/any/path", "TestBot"));
    }

    #[test]
    fn test_parse_disallow_all() {
        let content = "User-agent: *\nDisallow: /";
        let robots = ParsedRobots::from_content(content);
        assert!(!robots.is_allowed("/", "TestBot"));
    }

    #[test]
    fn test_parse_allow_and_disallow() {
        let content = "User-agent: *\nDisallow: /private\nAllow: /private/public";
        let robots = ParsedRobots::from_content(content);
        assert!(robots.is_allowed("/", "TestBot"));
        assert!(!robots.is_allowed("/private", "TestBot"));
        assert!(robots.is_allowed("/private/public", "TestBot"));
    }

    #[test]
    fn test_crawl_delay_wildcard() {
        let content = "User-agent: *\nCrawl-delay: 5\nDisallow:";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("AnyBot"), Some(5.0));
    }

    #[test]
    fn test_crawl_delay_specific_agent_wins_over_wildcard() {
        let content = "User-agent: *\nCrawl-delay: 10\n\nUser-agent: GoodBot\nCrawl-delay: 2\n";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("GoodBot"), Some(2.0));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
    }

    #[test]
    fn test_crawl_delay_absent() {
        let content = "User-agent: *\nDisallow: /admin";
        let robots = ParsedRobots::from_content(content);
        assert_eq!(robots.crawl_delay("AnyBot"), None);
    }

    #[test]
    fn test_crawl_delay_allow_all_is_none() {
        assert_eq!(ParsedRobots::allow_all().crawl_delay("AnyBot"), None);
    }
}
