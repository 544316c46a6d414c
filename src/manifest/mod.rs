//! Manifest/capabilities/provenance builder (C7): assembles the
//! self-describing top-level artifacts at finalize.

mod capabilities;

pub use capabilities::derive_capabilities;

use crate::config::Config;
use crate::model::AssetType;
use crate::writer::{hash_of_sorted, DatasetMeta};
use crate::ManifestError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use uuid::Uuid;

pub const ATLAS_VERSION: &str = "1.0";
const PRODUCER_NAME: &str = "atlas-crawl-core";
const PRODUCER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProducerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationRules {
    pub scheme_lowercased: bool,
    pub host_lowercased_punycoded: bool,
    pub default_port_elided: bool,
    pub path_case_preserved: bool,
    pub fragment_removed: bool,
    pub query_param_policy: String,
    pub block_list: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotsPolicy {
    pub respect: bool,
    pub overrides_used: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobStorageStats {
    pub blob_count: usize,
    pub merkle_root: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub dataset: String,
    pub version: String,
    pub producer: String,
    pub created_at: DateTime<Utc>,
    pub inputs: Vec<String>,
    pub parameters: serde_json::Value,
    pub output_record_count: u64,
    pub output_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub atlas_version: String,
    pub producer: ProducerInfo,
    pub crawl_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub config_hash: String,
    pub normalization_rules: NormalizationRules,
    pub privacy_policy: crate::config::PrivacyConfig,
    pub robots_policy: RobotsPolicy,
    pub capabilities: Vec<String>,
    pub datasets: Vec<DatasetMeta>,
    pub blob_storage: Option<BlobStorageStats>,
    pub audit_hash: String,
    pub incomplete: bool,
    pub notes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub crawl_id: Uuid,
    pub pages_crawled: u64,
    pub edges_discovered: u64,
    pub assets_discovered: u64,
    pub errors: u64,
    pub elapsed_seconds: f64,
    pub incomplete: bool,
}

pub struct ManifestInputs<'a> {
    pub crawl_id: Uuid,
    pub config: &'a Config,
    pub config_hash: String,
    pub datasets: Vec<DatasetMeta>,
    pub blob_storage: Option<BlobStorageStats>,
    pub incomplete: bool,
    pub notes: Vec<String>,
    pub asset_types_present: HashSet<AssetType>,
    pub elapsed_seconds: f64,
}

/// Assembles the capability set, one provenance record per dataset, and the
/// manifest itself, in that order (per 4.7).
pub fn assemble(inputs: ManifestInputs) -> (Manifest, Vec<ProvenanceRecord>, Summary) {
    let pages_count = inputs
        .datasets
        .iter()
        .find(|d| d.name == "pages")
        .map(|d| d.record_count)
        .unwrap_or(0);

    let capabilities = derive_capabilities(
        inputs.config.replay.tier,
        inputs.config.render.mode,
        pages_count,
        &inputs.asset_types_present,
    );

    let provenance: Vec<ProvenanceRecord> = inputs
        .datasets
        .iter()
        .map(|d| ProvenanceRecord {
            dataset: d.name.clone(),
            version: d.version.to_string(),
            producer: PRODUCER_NAME.to_string(),
            created_at: Utc::now(),
            inputs: Vec::new(),
            parameters: serde_json::json!({ "render_mode": format!("{:?}", inputs.config.render.mode) }),
            output_record_count: d.record_count,
            output_hash: d.dataset_hash.clone(),
        })
        .collect();

    let audit_hash = hash_of_sorted(inputs.datasets.iter().map(|d| d.dataset_hash.clone()));

    let edges_count = inputs
        .datasets
        .iter()
        .find(|d| d.name == "edges")
        .map(|d| d.record_count)
        .unwrap_or(0);
    let assets_count = inputs
        .datasets
        .iter()
        .find(|d| d.name == "assets")
        .map(|d| d.record_count)
        .unwrap_or(0);
    let errors_count = inputs
        .datasets
        .iter()
        .find(|d| d.name == "errors")
        .map(|d| d.record_count)
        .unwrap_or(0);

    let manifest = Manifest {
        atlas_version: ATLAS_VERSION.to_string(),
        producer: ProducerInfo {
            name: PRODUCER_NAME.to_string(),
            version: PRODUCER_VERSION.to_string(),
        },
        crawl_id: inputs.crawl_id,
        created_at: Utc::now(),
        config_hash: inputs.config_hash,
        normalization_rules: NormalizationRules {
            scheme_lowercased: true,
            host_lowercased_punycoded: true,
            default_port_elided: true,
            path_case_preserved: true,
            fragment_removed: true,
            query_param_policy: format!("{:?}", inputs.config.discovery.param_policy),
            block_list: inputs.config.discovery.block_list.clone(),
        },
        privacy_policy: inputs.config.privacy.clone(),
        robots_policy: RobotsPolicy {
            respect: inputs.config.robots.respect,
            overrides_used: inputs.config.robots.override_used,
        },
        capabilities,
        datasets: inputs.datasets,
        blob_storage: inputs.blob_storage,
        audit_hash,
        incomplete: inputs.incomplete,
        notes: inputs.notes,
    };

    let summary = Summary {
        crawl_id: inputs.crawl_id,
        pages_crawled: pages_count,
        edges_discovered: edges_count,
        assets_discovered: assets_count,
        errors: errors_count,
        elapsed_seconds: inputs.elapsed_seconds,
        incomplete: manifest.incomplete,
    };

    (manifest, provenance, summary)
}

/// Writes `manifest.json`, `capabilities.v1.json`, `summary.json`, and
/// `provenance.v1.jsonl.zst` at the archive root.
pub fn write_artifacts(
    archive_root: &Path,
    manifest: &Manifest,
    provenance: &[ProvenanceRecord],
    summary: &Summary,
) -> Result<(), ManifestError> {
    fs::create_dir_all(archive_root)?;

    fs::write(
        archive_root.join("manifest.json"),
        serde_json::to_vec_pretty(manifest)?,
    )?;

    let capabilities_doc = serde_json::json!({
        "capabilities": manifest.capabilities,
        "min_consumer_version": ATLAS_VERSION,
    });
    fs::write(
        archive_root.join("capabilities.v1.json"),
        serde_json::to_vec_pretty(&capabilities_doc)?,
    )?;

    fs::write(
        archive_root.join("summary.json"),
        serde_json::to_vec_pretty(summary)?,
    )?;

    let mut jsonl = String::new();
    for record in provenance {
        jsonl.push_str(&serde_json::to_string(record)?);
        jsonl.push('\n');
    }
    let compressed = zstd::encode_all(jsonl.as_bytes(), 0).map_err(std::io::Error::from)?;
    fs::write(archive_root.join("provenance.v1.jsonl.zst"), compressed)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::PartMeta;
    use tempfile::tempdir;

    fn dataset_meta(name: &str, hash: &str) -> DatasetMeta {
        DatasetMeta {
            name: name.to_string(),
            version: "v1",
            record_count: 2,
            compressed_bytes: 100,
            parts: vec![PartMeta {
                sequence: 0,
                filename: format!("{}.v1_part_000.jsonl.zst", name),
                record_count: 2,
                compressed_bytes: 100,
                sha256: hash.to_string(),
            }],
            dataset_hash: hash.to_string(),
            schema_uri: format!("schemas/{}.v1.schema.json", name),
        }
    }

    fn test_config() -> Config {
        toml::from_str(
            r#"seeds = ["https://example.com/"]
out-atls = "./x.atls"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_audit_hash_recomputes_from_dataset_hashes() {
        let config = test_config();
        let datasets = vec![dataset_meta("pages", "h1"), dataset_meta("edges", "h2")];
        let expected = hash_of_sorted(vec!["h1".to_string(), "h2".to_string()]);
        let inputs = ManifestInputs {
            crawl_id: Uuid::now_v7(),
            config: &config,
            config_hash: "cfg".to_string(),
            datasets,
            blob_storage: None,
            incomplete: false,
            notes: Vec::new(),
            asset_types_present: HashSet::new(),
            elapsed_seconds: 1.0,
        };
        let (manifest, _, _) = assemble(inputs);
        assert_eq!(manifest.audit_hash, expected);
    }

    #[test]
    fn test_write_artifacts_creates_expected_files() {
        let dir = tempdir().unwrap();
        let config = test_config();
        let inputs = ManifestInputs {
            crawl_id: Uuid::now_v7(),
            config: &config,
            config_hash: "cfg".to_string(),
            datasets: vec![dataset_meta("pages", "h1")],
            blob_storage: None,
            incomplete: false,
            notes: Vec::new(),
            asset_types_present: HashSet::new(),
            elapsed_seconds: 1.0,
        };
        let (manifest, provenance, summary) = assemble(inputs);
        write_artifacts(dir.path(), &manifest, &provenance, &summary).unwrap();
        assert!(dir.path().join("manifest.json").exists());
        assert!(dir.path().join("capabilities.v1.json").exists());
        assert!(dir.path().join("summary.json").exists());
        assert!(dir.path().join("provenance.v1.jsonl.zst").exists());
    }
}
