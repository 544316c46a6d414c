//! Atlas crawl core: a headless crawl engine that produces self-describing,
//! content-addressed archive files.
//!
//! The engine fetches and optionally renders seed URLs, honors robots.txt and
//! configured policy, extracts structured records, and streams them into a
//! compressed, integrity-hashed archive together with a manifest describing
//! its own contents. This crate is the engine only: it exposes a library
//! invocation contract (`Start`/`Pause`/`Resume`/`Cancel`/`Status`/
//! `Subscribe`, see [`scheduler::Scheduler`]) rather than a command-line
//! front end.

pub mod archive;
pub mod checkpoint;
pub mod config;
pub mod extract;
pub mod frontier;
pub mod manifest;
pub mod model;
pub mod policy;
pub mod ratelimit;
pub mod render;
pub mod robots;
pub mod scheduler;
pub mod url;
pub mod writer;

use thiserror::Error;

/// Top-level error type for the crawl engine.
///
/// Each variant corresponds to one of the error surfaces named in the
/// engine's error handling design: configuration, URL handling, policy,
/// rendering, extraction, writing, manifest assembly, and checkpointing.
#[derive(Debug, Error)]
pub enum AtlasError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("URL error: {0}")]
    Url(#[from] UrlError),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("request timeout for {url}")]
    FetchTimeout { url: String },

    #[error("network error fetching {url}: {message}")]
    FetchNetwork { url: String, message: String },

    #[error("too many redirects from {url}")]
    RedirectLimit { url: String },

    #[error("redirect loop detected at {url}")]
    RedirectLoop { url: String },

    #[error("render error for {url}: {message}")]
    Render { url: String, message: String },

    #[error("robots.txt error: {0}")]
    Robots(#[from] RobotsError),

    #[error("policy denied {url}: {reason}")]
    PolicyDenied { url: String, reason: String },

    #[error("writer error: {0}")]
    Writer(#[from] WriterError),

    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("fatal error: {0}")]
    FatalUnknown(String),
}

/// Configuration-specific errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("invalid host pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors.
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("failed to parse URL: {0}")]
    Parse(String),

    #[error("invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("missing host in URL")]
    MissingHost,

    #[error("malformed URL: {0}")]
    Malformed(String),
}

/// Robots.txt fetch/parse errors.
#[derive(Debug, Error)]
pub enum RobotsError {
    #[error("failed to fetch robots.txt for {origin}: {message}")]
    Fetch { origin: String, message: String },

    #[error("failed to parse robots.txt for {origin}: {message}")]
    Parse { origin: String, message: String },
}

/// Dataset writer errors.
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("IO error writing dataset {dataset}: {source}")]
    Io {
        dataset: String,
        #[source]
        source: std::io::Error,
    },

    #[error("compression error writing dataset {dataset}: {message}")]
    Compression { dataset: String, message: String },

    #[error("schema violation in dataset {dataset}: {message}")]
    SchemaViolation { dataset: String, message: String },

    #[error("serialization error in dataset {dataset}: {source}")]
    Serialization {
        dataset: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("dataset {0} is already finalized")]
    AlreadyFinalized(String),
}

/// Manifest/capabilities/provenance assembly errors.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("IO error assembling manifest: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error assembling manifest: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("post-finalize validation failed: {0}")]
    Validation(String),
}

/// Checkpoint/resume errors.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("IO error writing checkpoint: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error writing checkpoint: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("staging directory is not a valid checkpoint: {0}")]
    InvalidStagingDir(String),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AtlasError>;

/// Result type alias for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations.
pub type UrlResult<T> = std::result::Result<T, UrlError>;

pub use config::Config;
pub use model::{
    AssetRecord, DiscoverySource, EdgeRecord, ErrorRecord, EventRecord, NavReason, PageRecord,
    RobotsDecision, UrlTask, WaitCondition,
};
pub use scheduler::{CrawlOutcome, ExitStatus, Scheduler};
pub use url::normalize_url;
