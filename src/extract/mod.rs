//! Extractor set (C5): pure functions from a render result to typed records.
//!
//! Extractors never perform I/O. The writer, not the extractor, is
//! responsible for validating records against their dataset schema.

mod html;

pub use html::HtmlExtractor;

use crate::model::{AssetRecord, EdgeRecord, NavReason, PageRecord, RobotsDecision, UrlTask, WaitCondition};
use crate::render::RenderOutput;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Everything an extractor needs to turn one render result into records.
/// Holds no I/O handles; everything here is already in memory.
pub struct ExtractionContext<'a> {
    pub task: &'a UrlTask,
    pub page_id: Uuid,
    pub render: &'a RenderOutput,
    pub robots_decision: RobotsDecision,
    pub wait_condition: WaitCondition,
    pub captured_at: DateTime<Utc>,
    pub previous_page_id: Option<Uuid>,
}

/// The records one extractor contributed for one page.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutput {
    pub page: Option<PageRecord>,
    pub edges: Vec<EdgeRecord>,
    pub assets: Vec<AssetRecord>,
}

impl ExtractionOutput {
    fn merge(&mut self, mut other: ExtractionOutput) {
        if self.page.is_none() {
            self.page = other.page.take();
        }
        self.edges.append(&mut other.edges);
        self.assets.append(&mut other.assets);
    }
}

/// A pure, declaratively-composed transform from a render result to records.
pub trait Extractor: Send + Sync {
    fn name(&self) -> &str;
    fn extract(&self, ctx: &ExtractionContext) -> ExtractionOutput;
}

/// Runs a fixed list of extractors over one render result and merges their
/// output. Extractors are expected to contribute disjoint record kinds; the
/// first extractor to produce a page record wins that slot.
pub struct ExtractorSet {
    extractors: Vec<Box<dyn Extractor>>,
}

impl ExtractorSet {
    pub fn new(extractors: Vec<Box<dyn Extractor>>) -> Self {
        Self { extractors }
    }

    /// The default set for `raw`/`prerender` HTML crawls.
    pub fn default_html() -> Self {
        Self::new(vec![Box::new(HtmlExtractor)])
    }

    pub fn run(&self, ctx: &ExtractionContext) -> ExtractionOutput {
        let mut merged = ExtractionOutput::default();
        for extractor in &self.extractors {
            merged.merge(extractor.extract(ctx));
        }
        merged
    }
}

pub(crate) fn nav_reason_or(render: &RenderOutput) -> NavReason {
    render.nav_reason
}
