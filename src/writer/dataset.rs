use super::{hash_of_sorted, DatasetMeta, DatasetRecord, PartMeta};
use crate::WriterError;
use jsonschema::JSONSchema;
use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

const DATASET_VERSION: &str = "v1";
/// Target uncompressed size per part before a new one starts at finalize.
const DEFAULT_MAX_PART_BYTES: usize = 8 * 1024 * 1024;

/// Owns exactly one dataset's staging directory and part files.
///
/// Records are buffered in memory as they arrive and are only sorted,
/// chunked, and compressed at [`DatasetWriter::finalize`] — this keeps the
/// deterministic-ordering invariant (4.6.3) trivially correct at the cost of
/// holding one dataset's records in memory for the life of the crawl, which
/// is the same trade-off the writer contract allows when an external merge
/// isn't implemented.
pub struct DatasetWriter<R: DatasetRecord> {
    name: String,
    dataset_dir: PathBuf,
    schema: JSONSchema,
    schema_uri: String,
    max_part_bytes: usize,
    pending: Vec<R>,
    finalized: bool,
    _marker: PhantomData<R>,
}

impl<R: DatasetRecord> DatasetWriter<R> {
    /// Creates the dataset's staging directory and schema file under
    /// `archive_root`.
    pub fn init(
        archive_root: &Path,
        name: &str,
        schema_doc: serde_json::Value,
    ) -> Result<Self, WriterError> {
        let dataset_dir = archive_root.join(format!("{}.{}", name, DATASET_VERSION));
        fs::create_dir_all(&dataset_dir).map_err(|e| WriterError::Io {
            dataset: name.to_string(),
            source: e,
        })?;

        let schemas_dir = archive_root.join("schemas");
        fs::create_dir_all(&schemas_dir).map_err(|e| WriterError::Io {
            dataset: name.to_string(),
            source: e,
        })?;
        let schema_filename = format!("{}.{}.schema.json", name, DATASET_VERSION);
        let schema_path = schemas_dir.join(&schema_filename);
        let schema_bytes = serde_json::to_vec_pretty(&schema_doc).map_err(|e| {
            WriterError::Serialization {
                dataset: name.to_string(),
                source: e,
            }
        })?;
        fs::write(&schema_path, schema_bytes).map_err(|e| WriterError::Io {
            dataset: name.to_string(),
            source: e,
        })?;

        let schema = JSONSchema::compile(&schema_doc).map_err(|e| WriterError::SchemaViolation {
            dataset: name.to_string(),
            message: format!("dataset schema itself does not compile: {}", e),
        })?;

        Ok(Self {
            name: name.to_string(),
            dataset_dir,
            schema,
            schema_uri: format!("schemas/{}", schema_filename),
            max_part_bytes: DEFAULT_MAX_PART_BYTES,
            pending: Vec::new(),
            finalized: false,
            _marker: PhantomData,
        })
    }

    pub fn with_max_part_bytes(mut self, bytes: usize) -> Self {
        self.max_part_bytes = bytes;
        self
    }

    /// Validates `record` against the dataset schema and buffers it.
    pub fn write(&mut self, record: R) -> Result<(), WriterError> {
        if self.finalized {
            return Err(WriterError::AlreadyFinalized(self.name.clone()));
        }
        let value = serde_json::to_value(&record).map_err(|e| WriterError::Serialization {
            dataset: self.name.clone(),
            source: e,
        })?;
        if let Err(mut errors) = self.schema.validate(&value) {
            let message = errors
                .next()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "schema validation failed".to_string());
            return Err(WriterError::SchemaViolation {
                dataset: self.name.clone(),
                message,
            });
        }
        self.pending.push(record);
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Clones the currently buffered records, for checkpointing. Does not
    /// consume or mark the writer finalized.
    pub fn snapshot_pending(&self) -> Vec<R> {
        self.pending.clone()
    }

    /// Sorts all buffered records by the dataset's sort key, chunks them
    /// into parts, compresses each part, and writes it to disk.
    pub fn finalize(mut self) -> Result<DatasetMeta, WriterError> {
        if self.finalized {
            return Err(WriterError::AlreadyFinalized(self.name.clone()));
        }
        self.finalized = true;

        self.pending.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        let mut parts = Vec::new();
        let mut total_records = 0u64;
        let mut total_compressed_bytes = 0u64;
        let mut sequence = 0u32;
        let mut current_lines: Vec<String> = Vec::new();
        let mut current_bytes = 0usize;

        for record in &self.pending {
            let line = serde_json::to_string(record).map_err(|e| WriterError::Serialization {
                dataset: self.name.clone(),
                source: e,
            })?;
            current_bytes += line.len() + 1;
            current_lines.push(line);
            if current_bytes >= self.max_part_bytes {
                let meta = self.flush_part(sequence, &current_lines)?;
                total_records += current_lines.len() as u64;
                total_compressed_bytes += meta.compressed_bytes;
                parts.push(meta);
                sequence += 1;
                current_lines.clear();
                current_bytes = 0;
            }
        }
        if !current_lines.is_empty() {
            let meta = self.flush_part(sequence, &current_lines)?;
            total_records += current_lines.len() as u64;
            total_compressed_bytes += meta.compressed_bytes;
            parts.push(meta);
        }

        let dataset_hash = hash_of_sorted(parts.iter().map(|p| p.sha256.clone()));

        Ok(DatasetMeta {
            name: self.name.clone(),
            version: DATASET_VERSION,
            record_count: total_records,
            compressed_bytes: total_compressed_bytes,
            parts,
            dataset_hash,
            schema_uri: self.schema_uri.clone(),
        })
    }

    fn flush_part(&self, sequence: u32, lines: &[String]) -> Result<PartMeta, WriterError> {
        let joined = lines.join("\n") + "\n";
        let compressed = zstd::encode_all(joined.as_bytes(), 0).map_err(|e| {
            WriterError::Compression {
                dataset: self.name.clone(),
                message: e.to_string(),
            }
        })?;
        let sha256 = hex::encode(<sha2::Sha256 as sha2::Digest>::digest(&compressed));
        let filename = format!(
            "{}.{}_part_{:03}.jsonl.zst",
            self.name, DATASET_VERSION, sequence
        );
        let path = self.dataset_dir.join(&filename);
        fs::write(&path, &compressed).map_err(|e| WriterError::Io {
            dataset: self.name.clone(),
            source: e,
        })?;

        Ok(PartMeta {
            sequence,
            filename,
            record_count: lines.len() as u64,
            compressed_bytes: compressed.len() as u64,
            sha256,
        })
    }
}
