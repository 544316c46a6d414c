use serde::{Deserialize, Serialize};

/// Top-level crawl configuration, as loaded from a TOML file.
///
/// Field names mirror the recognized configuration surface: hyphenated in
/// TOML, snake_case in Rust.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub seeds: Vec<String>,
    #[serde(rename = "out-atls")]
    pub out_atls: String,

    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub replay: ReplayConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub robots: RobotsConfig,
    #[serde(default)]
    pub privacy: PrivacyConfig,
    #[serde(default)]
    pub checkpoint: CheckpointConfig,
    #[serde(default)]
    pub resume: ResumeConfig,

    #[serde(rename = "max-pages", default)]
    pub max_pages: u64,
    #[serde(rename = "max-depth", default = "default_max_depth")]
    pub max_depth: i64,
    #[serde(rename = "max-errors", default = "default_max_errors")]
    pub max_errors: i64,
}

fn default_max_depth() -> i64 {
    -1
}

fn default_max_errors() -> i64 {
    -1
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderMode {
    Raw,
    Prerender,
    Full,
}

impl Default for RenderMode {
    fn default() -> Self {
        RenderMode::Raw
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    #[serde(default)]
    pub mode: RenderMode,
    #[serde(default = "default_render_concurrency")]
    pub concurrency: usize,
    #[serde(rename = "timeout-ms", default = "default_render_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(rename = "max-bytes-per-page", default = "default_max_bytes_per_page")]
    pub max_bytes_per_page: u64,
}

fn default_render_concurrency() -> usize {
    8
}
fn default_render_timeout_ms() -> u64 {
    30_000
}
fn default_max_bytes_per_page() -> u64 {
    50 * 1024 * 1024
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            mode: RenderMode::default(),
            concurrency: default_render_concurrency(),
            timeout_ms: default_render_timeout_ms(),
            max_bytes_per_page: default_max_bytes_per_page(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayTier {
    Html,
    #[serde(rename = "html+css")]
    HtmlCss,
    Full,
}

impl Default for ReplayTier {
    fn default() -> Self {
        ReplayTier::Html
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayConfig {
    #[serde(default)]
    pub tier: ReplayTier,
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            tier: ReplayTier::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_rps")]
    pub rps: f64,
    #[serde(rename = "per-host-rps", default = "default_per_host_rps")]
    pub per_host_rps: f64,
    #[serde(rename = "user-agent", default = "default_user_agent")]
    pub user_agent: String,
}

fn default_rps() -> f64 {
    5.0
}
fn default_per_host_rps() -> f64 {
    1.0
}
fn default_user_agent() -> String {
    "AtlasCrawler/0.1 (+https://example.invalid/about; crawler@example.invalid)".to_string()
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            rps: default_rps(),
            per_host_rps: default_per_host_rps(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamPolicy {
    Keep,
    Sample,
    Strip,
}

impl Default for ParamPolicy {
    fn default() -> Self {
        ParamPolicy::Strip
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(rename = "follow-external", default)]
    pub follow_external: bool,
    #[serde(rename = "param-policy", default)]
    pub param_policy: ParamPolicy,
    #[serde(rename = "block-list", default = "default_block_list")]
    pub block_list: Vec<String>,
    #[serde(rename = "allow-urls", default)]
    pub allow_urls: Vec<String>,
    #[serde(rename = "deny-urls", default)]
    pub deny_urls: Vec<String>,
}

fn default_block_list() -> Vec<String> {
    vec![
        "utm_source".into(),
        "utm_medium".into(),
        "utm_campaign".into(),
        "utm_term".into(),
        "utm_content".into(),
        "fbclid".into(),
        "gclid".into(),
        "mc_eid".into(),
        "ref".into(),
    ]
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            follow_external: false,
            param_policy: ParamPolicy::default(),
            block_list: default_block_list(),
            allow_urls: Vec::new(),
            deny_urls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsConfig {
    #[serde(default = "default_true")]
    pub respect: bool,
    #[serde(rename = "override-used", default)]
    pub override_used: bool,
}

fn default_true() -> bool {
    true
}

impl Default for RobotsConfig {
    fn default() -> Self {
        Self {
            respect: true,
            override_used: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrivacyConfig {
    #[serde(rename = "strip-cookies", default = "default_true")]
    pub strip_cookies: bool,
    #[serde(rename = "strip-auth-headers", default = "default_true")]
    pub strip_auth_headers: bool,
    #[serde(rename = "redact-input-values", default = "default_true")]
    pub redact_input_values: bool,
    #[serde(rename = "redact-forms", default = "default_true")]
    pub redact_forms: bool,
}

impl Default for PrivacyConfig {
    fn default() -> Self {
        Self {
            strip_cookies: true,
            strip_auth_headers: true,
            redact_input_values: true,
            redact_forms: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_checkpoint_interval")]
    pub interval: u64,
    #[serde(rename = "every-seconds", default = "default_checkpoint_seconds")]
    pub every_seconds: u64,
}

fn default_checkpoint_interval() -> u64 {
    500
}
fn default_checkpoint_seconds() -> u64 {
    60
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval: default_checkpoint_interval(),
            every_seconds: default_checkpoint_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResumeConfig {
    #[serde(rename = "staging-dir", default)]
    pub staging_dir: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let render = RenderConfig::default();
        assert_eq!(render.mode, RenderMode::Raw);
        assert_eq!(render.max_bytes_per_page, 50 * 1024 * 1024);

        let robots = RobotsConfig::default();
        assert!(robots.respect);
        assert!(!robots.override_used);

        let privacy = PrivacyConfig::default();
        assert!(privacy.strip_cookies);
        assert!(privacy.strip_auth_headers);
        assert!(privacy.redact_input_values);
        assert!(privacy.redact_forms);
    }

    #[test]
    fn block_list_default_covers_common_tracking_params() {
        let list = default_block_list();
        assert!(list.contains(&"utm_source".to_string()));
        assert!(list.contains(&"fbclid".to_string()));
    }
}
