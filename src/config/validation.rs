use crate::config::types::{Config, DiscoveryConfig, HttpConfig, RenderConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_seeds(&config.seeds)?;
    validate_out_atls(&config.out_atls)?;
    validate_render_config(&config.render)?;
    validate_http_config(&config.http)?;
    validate_discovery_config(&config.discovery)?;
    validate_max_errors(config.max_errors)?;
    Ok(())
}

fn validate_seeds(seeds: &[String]) -> Result<(), ConfigError> {
    if seeds.is_empty() {
        return Err(ConfigError::Validation(
            "seeds must contain at least one URL".to_string(),
        ));
    }
    for seed in seeds {
        let url = Url::parse(seed)
            .map_err(|e| ConfigError::InvalidUrl(format!("invalid seed URL '{}': {}", seed, e)))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigError::Validation(format!(
                "seed URL '{}' must use http or https",
                seed
            )));
        }
    }
    Ok(())
}

fn validate_out_atls(out_atls: &str) -> Result<(), ConfigError> {
    if out_atls.len() < 5 {
        return Err(ConfigError::Validation(
            "out-atls must be at least 5 characters".to_string(),
        ));
    }
    Ok(())
}

fn validate_render_config(render: &RenderConfig) -> Result<(), ConfigError> {
    if render.concurrency == 0 {
        return Err(ConfigError::Validation(
            "render.concurrency must be > 0".to_string(),
        ));
    }
    if render.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "render.timeout-ms must be > 0".to_string(),
        ));
    }
    if render.max_bytes_per_page == 0 {
        return Err(ConfigError::Validation(
            "render.max-bytes-per-page must be > 0".to_string(),
        ));
    }
    Ok(())
}

fn validate_http_config(http: &HttpConfig) -> Result<(), ConfigError> {
    if http.rps <= 0.0 {
        return Err(ConfigError::Validation(
            "http.rps must be > 0".to_string(),
        ));
    }
    if http.per_host_rps <= 0.0 {
        return Err(ConfigError::Validation(
            "per-host-rps must be > 0".to_string(),
        ));
    }
    if http.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "http.user-agent cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_discovery_config(discovery: &DiscoveryConfig) -> Result<(), ConfigError> {
    for pattern in discovery.allow_urls.iter().chain(discovery.deny_urls.iter()) {
        validate_host_pattern(pattern)?;
    }
    Ok(())
}

fn validate_max_errors(max_errors: i64) -> Result<(), ConfigError> {
    // -1 = unlimited, 0 = abort on first error, any positive count is the budget.
    if max_errors < -1 {
        return Err(ConfigError::Validation(format!(
            "max-errors must be -1 (unlimited) or >= 0, got {}",
            max_errors
        )));
    }
    Ok(())
}

/// Validates a host pattern used in `discovery.allowUrls`/`denyUrls`.
///
/// Supports a bare domain (`example.com`), a leading-wildcard subdomain
/// pattern (`*.example.com`), or a `glob:`/`regex:` prefixed pattern handed
/// straight to the policy gate's matcher.
pub fn validate_host_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "host pattern cannot be empty".to_string(),
        ));
    }

    if let Some(rest) = pattern.strip_prefix("glob:") {
        globset::Glob::new(rest)
            .map_err(|e| ConfigError::InvalidPattern(format!("invalid glob '{}': {}", rest, e)))?;
        return Ok(());
    }
    if let Some(rest) = pattern.strip_prefix("regex:") {
        regex::Regex::new(rest).map_err(|e| {
            ConfigError::InvalidPattern(format!("invalid regex '{}': {}", rest, e))
        })?;
        return Ok(());
    }

    let domain = pattern.strip_prefix("*.").unwrap_or(pattern);
    validate_domain_string(domain)
}

fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "domain '{}' cannot start or end with '.' or '-'",
            domain
        )));
    }

    if domain.contains("..") {
        return Err(ConfigError::InvalidPattern(format!(
            "domain '{}' cannot contain consecutive dots",
            domain
        )));
    }

    if !domain.contains('.') {
        return Err(ConfigError::InvalidPattern(format!(
            "domain '{}' must contain at least one dot (e.g. 'example.com')",
            domain
        )));
    }

    Ok(())
}
