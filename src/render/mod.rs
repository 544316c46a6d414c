//! Fetch+Render (C4): the core treats rendering as a pluggable capability.
//!
//! This crate ships one concrete implementation, `raw` (HTTP only, see
//! [`http::HttpRenderer`]). `prerender` and `full` modes are part of the
//! interface — a headless-browser-backed [`Renderer`] can be supplied by an
//! embedder — but are not implemented here.

pub mod http;

use crate::config::{PrivacyConfig, RenderMode};
use crate::model::{NavReason, NavigationTimings, WaitCondition};
use crate::AtlasError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Input to a render operation.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: Url,
    pub wait_condition: WaitCondition,
    pub timeout: Duration,
    pub max_bytes: u64,
    pub privacy: PrivacyConfig,
    /// Persistent session key, scoped per origin, for renderers that keep
    /// cookies/storage across pages of the same site.
    pub session_key: Option<String>,
}

/// The full output of a render operation, per the fetch+render contract.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub final_url: String,
    pub status_code: Option<u16>,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub declared_encoding: Option<String>,
    pub dom: Option<String>,
    pub navigation: NavigationTimings,
    pub nav_reason: NavReason,
    pub screenshot: Option<Vec<u8>>,
    pub console_messages: Option<Vec<String>>,
    pub accessibility_tree: Option<serde_json::Value>,
}

/// A pluggable fetch/render backend.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(
        &self,
        request: &RenderRequest,
        cancel: &CancellationToken,
    ) -> Result<RenderOutput, AtlasError>;
}

/// Selects the concrete renderer for a configured mode. Only `raw` has a
/// built-in implementation; other modes are the embedder's responsibility.
pub fn default_renderer_for(
    mode: RenderMode,
    user_agent: &str,
) -> Result<Box<dyn Renderer>, AtlasError> {
    match mode {
        RenderMode::Raw => Ok(Box::new(http::HttpRenderer::new(user_agent)?)),
        RenderMode::Prerender | RenderMode::Full => Err(AtlasError::Render {
            url: String::new(),
            message: format!(
                "render mode {:?} requires an embedder-supplied renderer; this build only ships raw",
                mode
            ),
        }),
    }
}
