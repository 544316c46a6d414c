//! Crawl configuration: loading, validating, and hashing the TOML
//! configuration surface described in the invocation contract.
//!
//! # Example
//!
//! ```no_run
//! use atlas_crawl_core::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("will write archive to {}", config.out_atls);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    CheckpointConfig, Config, DiscoveryConfig, HttpConfig, ParamPolicy, PrivacyConfig,
    RenderConfig, RenderMode, ReplayConfig, ReplayTier, ResumeConfig, RobotsConfig,
};

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use validation::{validate, validate_host_pattern};
