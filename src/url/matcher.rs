use globset::Glob;
use regex::Regex;

/// Checks if a domain matches a wildcard pattern.
///
/// Supports two pattern shapes: an exact match (`"example.com"` matches only
/// `"example.com"`), and a leading-wildcard match (`"*.example.com"` matches
/// the bare domain plus any subdomain).
///
/// # Examples
///
/// ```
/// use atlas_crawl_core::url::matches_wildcard;
///
/// assert!(matches_wildcard("example.com", "example.com"));
/// assert!(matches_wildcard("*.example.com", "blog.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    if let Some(base) = pattern.strip_prefix("*.") {
        candidate == base || candidate.ends_with(&format!(".{}", base))
    } else {
        candidate == pattern
    }
}

/// A compiled host pattern for the policy gate's allow/deny lists.
///
/// Three shapes are supported, selected by prefix:
/// - `example.com` / `*.example.com` — the simple wildcard form.
/// - `glob:<pattern>` — a `globset` glob matched against the host.
/// - `regex:<pattern>` — a `regex` pattern matched against the host.
pub enum HostPattern {
    Wildcard(String),
    Glob(globset::GlobMatcher),
    Regex(Regex),
}

impl HostPattern {
    pub fn compile(pattern: &str) -> Result<Self, String> {
        if let Some(rest) = pattern.strip_prefix("glob:") {
            let glob = Glob::new(rest).map_err(|e| e.to_string())?;
            return Ok(HostPattern::Glob(glob.compile_matcher()));
        }
        if let Some(rest) = pattern.strip_prefix("regex:") {
            let re = Regex::new(rest).map_err(|e| e.to_string())?;
            return Ok(HostPattern::Regex(re));
        }
        Ok(HostPattern::Wildcard(pattern.to_string()))
    }

    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            HostPattern::Wildcard(pattern) => matches_wildcard(pattern, candidate),
            HostPattern::Glob(matcher) => matcher.is_match(candidate),
            HostPattern::Regex(re) => re.is_match(candidate),
        }
    }
}

/// Compiles a list of raw host patterns, skipping ones that fail to
/// compile (the policy gate should have validated these at config-load
/// time via `config::validate_host_pattern`; this is a defensive fallback).
pub fn compile_patterns(patterns: &[String]) -> Vec<HostPattern> {
    patterns
        .iter()
        .filter_map(|p| HostPattern::compile(p).ok())
        .collect()
}

/// Returns true if any compiled pattern matches the candidate host.
pub fn any_matches(patterns: &[HostPattern], candidate: &str) -> bool {
    patterns.iter().any(|p| p.matches(candidate))
}
