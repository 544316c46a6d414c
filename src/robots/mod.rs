//! Robots.txt fetching, parsing, and per-origin caching.

mod cache;
mod parser;

pub use cache::{CachedRobots, RobotsCache};
pub use parser::ParsedRobots;

use crate::RobotsError;
use std::time::Duration;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const BASE_RETRY_DELAY_MS: u64 = 200;

/// Fetches and parses `robots.txt` for an origin (e.g.
/// `https://example.com`), retrying transient failures with exponential
/// backoff up to a bounded count before giving up.
///
/// A 404 (no robots.txt published) is treated as allow-all, not an error,
/// matching the usual web convention. Any other non-success status, or a
/// network failure that persists across all retries, is reported as a
/// [`RobotsError::Fetch`] so the caller can apply the configured fallback
/// policy and cache a soft failure.
pub async fn fetch_robots(
    client: &reqwest::Client,
    origin: &str,
    user_agent: &str,
) -> Result<ParsedRobots, RobotsError> {
    let robots_url = format!("{}/robots.txt", origin.trim_end_matches('/'));
    let mut last_error: Option<String> = None;

    for attempt in 0..MAX_FETCH_ATTEMPTS {
        if attempt > 0 {
            let delay = BASE_RETRY_DELAY_MS * 2u64.pow(attempt - 1);
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        let result = client
            .get(&robots_url)
            .header("User-Agent", user_agent)
            .send()
            .await;

        match result {
            Ok(response) => {
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Ok(ParsedRobots::allow_all());
                }
                if !response.status().is_success() {
                    last_error = Some(format!("HTTP status {}", response.status()));
                    if !response.status().is_server_error() {
                        // 4xx other than 404: not retryable, treat as allow-all per convention.
                        return Ok(ParsedRobots::allow_all());
                    }
                    continue;
                }
                return match response.text().await {
                    Ok(body) => Ok(ParsedRobots::from_content(&body)),
                    Err(e) => Err(RobotsError::Parse {
                        origin: origin.to_string(),
                        message: e.to_string(),
                    }),
                };
            }
            Err(e) => {
                last_error = Some(e.to_string());
            }
        }
    }

    Err(RobotsError::Fetch {
        origin: origin.to_string(),
        message: last_error.unwrap_or_else(|| "unknown fetch failure".to_string()),
    })
}

/// Checks whether a URL path is allowed by the given parsed robots.txt.
pub fn is_allowed(robots: &ParsedRobots, url: &str, user_agent: &str) -> bool {
    robots.is_allowed(url, user_agent)
}
