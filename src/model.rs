//! The archive's data model: the record types that flow from fetch/render
//! through extraction into the dataset writer, plus the frontier's own
//! work-unit type.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// How a URL task was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    Seed,
    Sitemap,
    Link,
    Redirect,
}

/// One unit of crawl work: a URL waiting to be fetched.
///
/// Invariant upheld by the frontier: no two in-flight tasks share the same
/// `normalized_url`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlTask {
    pub url: String,
    pub normalized_url: String,
    pub depth: u32,
    pub discovery_source: DiscoverySource,
    pub referrer: Option<String>,
    pub attempt_count: u32,
}

impl UrlTask {
    pub fn seed(url: impl Into<String>, normalized_url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            normalized_url: normalized_url.into(),
            depth: 0,
            discovery_source: DiscoverySource::Seed,
            referrer: None,
            attempt_count: 0,
        }
    }

    pub fn child(
        url: impl Into<String>,
        normalized_url: impl Into<String>,
        depth: u32,
        discovery_source: DiscoverySource,
        referrer: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            normalized_url: normalized_url.into(),
            depth,
            discovery_source,
            referrer: Some(referrer.into()),
            attempt_count: 0,
        }
    }
}

/// Why the robots gate allowed or denied a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RobotsDecision {
    Allow,
    Disallow,
    /// Disallowed by robots.txt but allowed anyway because override mode is on.
    Override,
    /// robots.txt could not be fetched; the configured fallback policy applied.
    Unknown,
}

/// The render-completion rule that was in effect for a page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    DomContentLoaded,
    NetworkIdle,
    Selector(String),
    Timeout,
}

/// Why navigation for a page ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavReason {
    Load,
    NetworkIdle,
    Timeout,
    Error,
    Fetch,
}

/// Navigation timing milestones, in milliseconds since navigation start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NavigationTimings {
    pub nav_start_ms: u64,
    pub dom_content_loaded_ms: Option<u64>,
    pub load_event_end_ms: Option<u64>,
    pub network_idle_ms: Option<u64>,
}

/// One crawled page. Identity is `page_id`, a time-ordered UUID minted
/// before fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_id: Uuid,
    pub url: String,
    pub normalized_url: String,
    pub final_url: String,
    pub status_code: Option<u16>,
    pub content_type: Option<String>,
    pub response_size: u64,
    pub response_time_ms: u64,
    pub body_sha256: String,
    pub dom_sha256: Option<String>,
    pub body_blob_ref: Option<String>,
    pub depth: u32,
    pub discovery_source: DiscoverySource,
    pub referrer: Option<String>,
    pub robots_decision: RobotsDecision,
    pub noindex: bool,
    pub wait_condition: WaitCondition,
    pub navigation: NavigationTimings,
    pub nav_reason: NavReason,
    pub captured_at: DateTime<Utc>,
    pub previous_page_id: Option<Uuid>,
}

/// Coarse DOM region an edge's anchor was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomLocation {
    Nav,
    Header,
    Footer,
    Main,
    Other,
}

/// A directed link from a source page to a target URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeRecord {
    pub source_page_id: Uuid,
    pub target_url: String,
    pub target_page_id: Option<Uuid>,
    pub anchor_text: Option<String>,
    pub rel: Option<String>,
    pub internal: bool,
    pub dom_location: DomLocation,
    pub discovery_render_mode: String,
    /// Index in DOM-discovery order; used as the tie-break sort key.
    pub sequence: u32,
}

/// Coarse asset type classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Image,
    Video,
    Audio,
    Other,
    Css,
    Js,
    Font,
}

/// A media/resource reference discovered on a page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetRecord {
    pub page_id: Uuid,
    pub asset_url: String,
    pub asset_type: AssetType,
    pub alt_text: Option<String>,
    pub tag_name: String,
    pub size: Option<u64>,
    pub body_blob_ref: Option<String>,
}

/// The phase an error occurred in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPhase {
    Fetch,
    Render,
    Extract,
    Write,
}

/// Error kinds, matching the engine's error handling design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FetchTimeout,
    FetchNetwork,
    FetchHttpError,
    RenderTimeout,
    RenderCrash,
    ExtractValidation,
    WriteIo,
    RobotsFetch,
    SchemaViolation,
    CheckpointIo,
    FatalUnknown,
}

impl ErrorKind {
    /// Whether a failure of this kind counts against the error budget.
    /// Policy denials are not an `ErrorKind` at all (they never reach the
    /// errors dataset); every kind that does reach the dataset counts,
    /// except transient errors that the retry loop ultimately resolved
    /// (those never produce a record in the first place).
    pub fn counts_against_budget(&self) -> bool {
        true
    }
}

/// An error record. Errors are a dataset, not exceptions: they are always
/// written, even when fatal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub url: String,
    pub timestamp: DateTime<Utc>,
    pub phase: ErrorPhase,
    pub kind: ErrorKind,
    pub message: String,
    pub retry_count: u32,
}

/// Structured crawl log entry, the machine-readable counterpart to
/// `tracing` output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub event_code: String,
    pub crawl_id: Uuid,
    pub page_id: Option<Uuid>,
    pub sequence: u64,
    pub payload: serde_json::Value,
}

/// Mints a time-ordered page identity (UUIDv7), per the engine's design note
/// on deterministic UUIDs: lexicographic sort over `page_id` approximates
/// chronological order.
pub fn new_page_id() -> Uuid {
    Uuid::now_v7()
}
