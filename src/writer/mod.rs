//! Dataset writer (C6): streams typed records into sharded,
//! Zstandard-compressed JSONL parts with per-part integrity hashes.

mod blob;
mod dataset;
pub mod schemas;

pub use blob::BlobStore;
pub use dataset::DatasetWriter;

use crate::model::{AssetRecord, EdgeRecord, ErrorRecord, EventRecord, PageRecord};
use serde::Serialize;
use uuid::Uuid;

/// Orders a dataset's records deterministically before finalize, per the
/// dataset-specific sort keys.
pub trait DatasetRecord: Serialize + Clone + Send + Sync {
    type SortKey: Ord;
    fn sort_key(&self) -> Self::SortKey;
}

impl DatasetRecord for PageRecord {
    type SortKey = String;
    fn sort_key(&self) -> Self::SortKey {
        self.normalized_url.clone()
    }
}

impl DatasetRecord for EdgeRecord {
    type SortKey = (Uuid, u32);
    fn sort_key(&self) -> Self::SortKey {
        (self.source_page_id, self.sequence)
    }
}

impl DatasetRecord for AssetRecord {
    type SortKey = (Uuid, String);
    fn sort_key(&self) -> Self::SortKey {
        (self.page_id, self.asset_url.clone())
    }
}

impl DatasetRecord for ErrorRecord {
    type SortKey = (chrono::DateTime<chrono::Utc>, String);
    fn sort_key(&self) -> Self::SortKey {
        (self.timestamp, self.url.clone())
    }
}

impl DatasetRecord for EventRecord {
    type SortKey = (chrono::DateTime<chrono::Utc>, u64);
    fn sort_key(&self) -> Self::SortKey {
        (self.timestamp, self.sequence)
    }
}

/// One part file's recorded metadata, as it will appear in the manifest.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct PartMeta {
    pub sequence: u32,
    pub filename: String,
    pub record_count: u64,
    pub compressed_bytes: u64,
    pub sha256: String,
}

/// A finalized dataset's metadata, returned by `DatasetWriter::finalize`.
#[derive(Debug, Clone, Serialize, serde::Deserialize)]
pub struct DatasetMeta {
    pub name: String,
    pub version: &'static str,
    pub record_count: u64,
    pub compressed_bytes: u64,
    pub parts: Vec<PartMeta>,
    pub dataset_hash: String,
    pub schema_uri: String,
}

/// SHA-256 of the sorted concatenation of a set of hex-encoded hashes, used
/// both for a dataset's hash (over its part hashes) and the archive's
/// `audit_hash` (over its dataset hashes).
pub fn hash_of_sorted(hashes: impl IntoIterator<Item = String>) -> String {
    use sha2::{Digest, Sha256};
    let mut sorted: Vec<String> = hashes.into_iter().collect();
    sorted.sort();
    let mut hasher = Sha256::new();
    for h in &sorted {
        hasher.update(h.as_bytes());
    }
    hex::encode(hasher.finalize())
}
