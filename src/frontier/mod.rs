//! The frontier (C1): the queue of URLs to crawl. Deduplicates by
//! normalized URL and orders pops breadth-first (ascending depth, FIFO
//! within a depth).

use crate::model::UrlTask;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
struct QueuedTask {
    depth: u32,
    seq: u64,
    task: UrlTask,
}

impl PartialEq for QueuedTask {
    fn eq(&self, other: &Self) -> bool {
        self.depth == other.depth && self.seq == other.seq
    }
}
impl Eq for QueuedTask {}

impl Ord for QueuedTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so lower depth (and, within a
        // depth, lower sequence number / earlier insertion) pops first.
        other
            .depth
            .cmp(&self.depth)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}
impl PartialOrd for QueuedTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct FrontierState {
    heap: BinaryHeap<QueuedTask>,
    /// Every normalized URL ever admitted. Monotonically growing; this is
    /// the deduplication identity and the authoritative completed-set for
    /// checkpoint/resume.
    seen: HashSet<String>,
    in_flight: HashSet<String>,
    next_seq: u64,
}

/// A serializable view of pending work and completed URLs, for checkpointing.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FrontierSnapshot {
    pub pending: Vec<UrlTask>,
    pub completed: Vec<String>,
}

pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    max_depth: Option<u32>,
    max_pages: Option<u64>,
}

impl Frontier {
    /// `max_depth` is `None` for unlimited (config `-1`); `max_pages` is
    /// `None` for unlimited (config `0`).
    pub fn new(max_depth: Option<u32>, max_pages: Option<u64>) -> Self {
        Self {
            state: Mutex::new(FrontierState {
                heap: BinaryHeap::new(),
                seen: HashSet::new(),
                in_flight: HashSet::new(),
                next_seq: 0,
            }),
            notify: Notify::new(),
            max_depth,
            max_pages,
        }
    }

    /// Accepts a task; returns whether it was newly added. Tasks beyond
    /// `maxDepth` or the page budget are rejected silently (no error, no
    /// record produced).
    pub async fn push(&self, task: UrlTask) -> bool {
        if let Some(max_depth) = self.max_depth {
            if task.depth > max_depth {
                return false;
            }
        }

        let mut state = self.state.lock().await;
        if state.seen.contains(&task.normalized_url) {
            return false;
        }
        if let Some(max_pages) = self.max_pages {
            if state.seen.len() as u64 >= max_pages {
                return false;
            }
        }

        state.seen.insert(task.normalized_url.clone());
        let seq = state.next_seq;
        state.next_seq += 1;
        state.heap.push(QueuedTask {
            depth: task.depth,
            seq,
            task,
        });
        drop(state);
        self.notify.notify_waiters();
        true
    }

    /// Yields the next task, suspending until one is available or `cancel`
    /// fires.
    pub async fn pop(&self, cancel: &CancellationToken) -> Option<UrlTask> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(queued) = state.heap.pop() {
                    state.in_flight.insert(queued.task.normalized_url.clone());
                    return Some(queued.task);
                }
            }
            if cancel.is_cancelled() {
                return None;
            }
            tokio::select! {
                _ = self.notify.notified() => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }

    /// Marks a popped task as permanently completed (success or terminal
    /// skip). It remains in `seen` forever so it can never be re-admitted.
    pub async fn complete(&self, normalized_url: &str) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(normalized_url);
    }

    /// Releases a popped task that failed and should be eligible for retry:
    /// removed from `seen` so a subsequent `push` of the same normalized
    /// URL is admitted again.
    pub async fn release_for_retry(&self, normalized_url: &str) {
        let mut state = self.state.lock().await;
        state.in_flight.remove(normalized_url);
        state.seen.remove(normalized_url);
    }

    pub async fn size(&self) -> usize {
        self.state.lock().await.heap.len()
    }

    pub async fn is_empty(&self) -> bool {
        let state = self.state.lock().await;
        state.heap.is_empty() && state.in_flight.is_empty()
    }

    pub async fn snapshot(&self) -> FrontierSnapshot {
        let state = self.state.lock().await;
        let mut pending: Vec<(u32, u64, UrlTask)> = state
            .heap
            .iter()
            .map(|q| (q.depth, q.seq, q.task.clone()))
            .collect();
        pending.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        FrontierSnapshot {
            pending: pending.into_iter().map(|(_, _, t)| t).collect(),
            completed: state.seen.iter().cloned().collect(),
        }
    }

    pub async fn restore(&self, snapshot: FrontierSnapshot) {
        let mut state = self.state.lock().await;
        state.heap.clear();
        state.seen.clear();
        state.in_flight.clear();
        state.next_seq = 0;
        for url in snapshot.completed {
            state.seen.insert(url);
        }
        for task in snapshot.pending {
            if state.seen.contains(&task.normalized_url) {
                continue;
            }
            state.seen.insert(task.normalized_url.clone());
            let seq = state.next_seq;
            state.next_seq += 1;
            state.heap.push(QueuedTask {
                depth: task.depth,
                seq,
                task,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DiscoverySource;

    fn task(url: &str, depth: u32) -> UrlTask {
        UrlTask {
            url: url.to_string(),
            normalized_url: url.to_string(),
            depth,
            discovery_source: DiscoverySource::Link,
            referrer: None,
            attempt_count: 0,
        }
    }

    #[tokio::test]
    async fn test_dedup_by_normalized_url() {
        let frontier = Frontier::new(None, None);
        assert!(frontier.push(task("https://a.test/", 0)).await);
        assert!(!frontier.push(task("https://a.test/", 0)).await);
        assert_eq!(frontier.size().await, 1);
    }

    #[tokio::test]
    async fn test_depth_monotonicity() {
        let frontier = Frontier::new(None, None);
        frontier.push(task("https://a.test/d1a", 1)).await;
        frontier.push(task("https://a.test/d0", 0)).await;
        frontier.push(task("https://a.test/d1b", 1)).await;

        let cancel = CancellationToken::new();
        let first = frontier.pop(&cancel).await.unwrap();
        assert_eq!(first.depth, 0);
        let second = frontier.pop(&cancel).await.unwrap();
        assert_eq!(second.depth, 1);
        let third = frontier.pop(&cancel).await.unwrap();
        assert_eq!(third.depth, 1);
    }

    #[tokio::test]
    async fn test_fifo_within_depth() {
        let frontier = Frontier::new(None, None);
        frontier.push(task("https://a.test/first", 0)).await;
        frontier.push(task("https://a.test/second", 0)).await;

        let cancel = CancellationToken::new();
        let first = frontier.pop(&cancel).await.unwrap();
        assert_eq!(first.url, "https://a.test/first");
    }

    #[tokio::test]
    async fn test_max_depth_rejects_deeper_tasks() {
        let frontier = Frontier::new(Some(1), None);
        assert!(frontier.push(task("https://a.test/d1", 1)).await);
        assert!(!frontier.push(task("https://a.test/d2", 2)).await);
    }

    #[tokio::test]
    async fn test_max_pages_rejects_past_budget() {
        let frontier = Frontier::new(None, Some(1));
        assert!(frontier.push(task("https://a.test/one", 0)).await);
        assert!(!frontier.push(task("https://a.test/two", 0)).await);
    }

    #[tokio::test]
    async fn test_release_for_retry_allows_repush() {
        let frontier = Frontier::new(None, None);
        frontier.push(task("https://a.test/", 0)).await;
        let cancel = CancellationToken::new();
        let popped = frontier.pop(&cancel).await.unwrap();
        frontier.release_for_retry(&popped.normalized_url).await;
        assert!(frontier.push(task("https://a.test/", 0)).await);
    }

    #[tokio::test]
    async fn test_complete_keeps_url_deduped_forever() {
        let frontier = Frontier::new(None, None);
        frontier.push(task("https://a.test/", 0)).await;
        let cancel = CancellationToken::new();
        let popped = frontier.pop(&cancel).await.unwrap();
        frontier.complete(&popped.normalized_url).await;
        assert!(!frontier.push(task("https://a.test/", 0)).await);
    }

    #[tokio::test]
    async fn test_pop_on_empty_returns_none_when_cancelled() {
        let frontier = Frontier::new(None, None);
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(frontier.pop(&cancel).await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_restore_roundtrip() {
        let frontier = Frontier::new(None, None);
        frontier.push(task("https://a.test/pending", 0)).await;
        let cancel = CancellationToken::new();
        let completed = frontier.pop(&cancel).await.unwrap();
        frontier.complete(&completed.normalized_url).await;
        frontier.push(task("https://a.test/still-pending", 1)).await;

        let snap = frontier.snapshot().await;
        assert_eq!(snap.pending.len(), 1);
        assert!(snap.completed.contains(&"https://a.test/pending".to_string()));

        let restored = Frontier::new(None, None);
        restored.restore(snap).await;
        assert_eq!(restored.size().await, 1);
        assert!(!restored.push(task("https://a.test/pending", 0)).await);
    }
}
