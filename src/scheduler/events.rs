//! Lifecycle event emission: the machine-readable counterpart to the
//! scheduler's `tracing` spans, broadcast to anything that subscribed.

use crate::model::EventRecord;
use chrono::Utc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use uuid::Uuid;

pub const EVENT_CRAWL_STARTED: &str = "crawl.started";
pub const EVENT_CRAWL_PAUSED: &str = "crawl.paused";
pub const EVENT_CRAWL_RESUMED: &str = "crawl.resumed";
pub const EVENT_CRAWL_CANCELLING: &str = "crawl.cancelling";
pub const EVENT_CRAWL_FINISHED: &str = "crawl.finished";
pub const EVENT_PAGE_COMPLETED: &str = "page.completed";
pub const EVENT_PAGE_ERROR: &str = "page.error";
pub const EVENT_POLICY_DENIED: &str = "policy.denied";
pub const EVENT_ERROR_BUDGET_EXCEEDED: &str = "error_budget.exceeded";
pub const EVENT_HEARTBEAT: &str = "heartbeat";
pub const EVENT_CHECKPOINT_WRITTEN: &str = "checkpoint.written";
pub const EVENT_CHECKPOINT_FAILED: &str = "checkpoint.failed";

/// Default channel capacity for the event broadcast; slow subscribers that
/// fall this far behind see a `Lagged` error on their next recv, not a
/// stall of the crawl.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Mints monotonically increasing sequence numbers for [`EventRecord`], one
/// per crawl.
#[derive(Debug, Default)]
pub struct EventSequencer(AtomicU64);

impl EventSequencer {
    pub fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed)
    }
}

/// Builds and broadcasts one [`EventRecord`]. Broadcast failures (no active
/// subscribers) are not errors — the events dataset is still the record of
/// truth.
pub fn emit(
    tx: &broadcast::Sender<EventRecord>,
    sequencer: &EventSequencer,
    crawl_id: Uuid,
    page_id: Option<Uuid>,
    level: &str,
    event_code: &str,
    payload: serde_json::Value,
) -> EventRecord {
    let record = EventRecord {
        timestamp: Utc::now(),
        level: level.to_string(),
        event_code: event_code.to_string(),
        crawl_id,
        page_id,
        sequence: sequencer.next(),
        payload,
    };
    let _ = tx.send(record.clone());
    record
}
