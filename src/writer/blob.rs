//! Content-addressed blob store (optional): large immutable bytes (HTML
//! bodies, screenshots, subresources) sharded by the first four hex chars
//! of their SHA-256.

use super::hash_of_sorted;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

pub struct BlobStore {
    root: PathBuf,
    /// Full hex hashes already written, for in-process dedup without
    /// re-stat'ing the filesystem on every put.
    known: HashSet<String>,
}

impl BlobStore {
    pub fn new(archive_root: &Path) -> Self {
        Self {
            root: archive_root.join("blobs").join("sha256"),
            known: HashSet::new(),
        }
    }

    /// Writes `bytes` under its content hash if not already present.
    /// Returns the relative path to record as a record's `body_blob_ref`.
    pub fn put(&mut self, bytes: &[u8]) -> std::io::Result<String> {
        let hash = hex::encode(Sha256::digest(bytes));
        let shard_a = &hash[0..2];
        let shard_b = &hash[2..4];
        let rel_path = format!("blobs/sha256/{}/{}/{}.zst", shard_a, shard_b, hash);

        if self.known.insert(hash.clone()) {
            let dir = self.root.join(shard_a).join(shard_b);
            fs::create_dir_all(&dir)?;
            let file_path = dir.join(format!("{}.zst", hash));
            if !file_path.exists() {
                let compressed = zstd::encode_all(bytes, 0)?;
                fs::write(file_path, compressed)?;
            }
        }
        Ok(rel_path)
    }

    pub fn blob_count(&self) -> usize {
        self.known.len()
    }

    /// A Merkle-style root over every blob hash currently known, recorded
    /// in the manifest's blob storage statistics.
    pub fn merkle_root(&self) -> String {
        hash_of_sorted(self.known.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_put_dedupes_identical_content() {
        let dir = tempdir().unwrap();
        let mut store = BlobStore::new(dir.path());
        let ref1 = store.put(b"hello").unwrap();
        let ref2 = store.put(b"hello").unwrap();
        assert_eq!(ref1, ref2);
        assert_eq!(store.blob_count(), 1);
    }

    #[test]
    fn test_put_distinguishes_different_content() {
        let dir = tempdir().unwrap();
        let mut store = BlobStore::new(dir.path());
        let ref1 = store.put(b"hello").unwrap();
        let ref2 = store.put(b"world").unwrap();
        assert_ne!(ref1, ref2);
        assert_eq!(store.blob_count(), 2);
    }

    #[test]
    fn test_merkle_root_stable_across_insertion_order() {
        let dir1 = tempdir().unwrap();
        let mut store1 = BlobStore::new(dir1.path());
        store1.put(b"a").unwrap();
        store1.put(b"b").unwrap();

        let dir2 = tempdir().unwrap();
        let mut store2 = BlobStore::new(dir2.path());
        store2.put(b"b").unwrap();
        store2.put(b"a").unwrap();

        assert_eq!(store1.merkle_root(), store2.merkle_root());
    }
}
