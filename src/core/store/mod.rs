//! Partitioned structured store
//!
//! Layout of a built store:
//!
//! ```text
//! <store_dir>/manifest.json        build metadata and per-partition counts
//! <store_dir>/partitions/<key>.db  entity_records of one partition (SQLite)
//! ```
//!
//! The store is written once by [`crate::core::ingest::StoreBuilder`] and is
//! read-only afterwards, so any number of readers may open it concurrently.

pub mod partition;

pub use partition::{Coverage, MaterializeOutcome, PartitionReader, PartitionWriter};

use crate::domain::{Cnpj, DeltaError, EntityRecord, PartitionKey, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const PARTITIONS_DIR: &str = "partitions";

/// Row counters of one source category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    pub files: usize,
    pub total_rows: u64,
    pub skipped_rows: u64,
    pub fallback_decoded_rows: u64,
}

impl CategoryStats {
    pub fn valid_rows(&self) -> u64 {
        self.total_rows - self.skipped_rows
    }

    pub fn skip_rate(&self) -> f64 {
        if self.total_rows == 0 {
            0.0
        } else {
            self.skipped_rows as f64 / self.total_rows as f64
        }
    }
}

/// Metadata written at the end of a successful build
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreManifest {
    pub build_id: Uuid,
    pub built_at: DateTime<Utc>,
    pub partition_prefix_len: usize,
    /// Record count per partition key
    pub partitions: BTreeMap<String, u64>,
    /// Row counters per source category name
    pub categories: BTreeMap<String, CategoryStats>,
    pub orphan_establishments: u64,
}

impl StoreManifest {
    pub fn total_records(&self) -> u64 {
        self.partitions.values().sum()
    }
}

pub fn partition_file(store_dir: &Path, key: &PartitionKey) -> PathBuf {
    store_dir.join(PARTITIONS_DIR).join(format!("{key}.db"))
}

/// Handle on a built store
#[derive(Debug, Clone)]
pub struct StructuredStore {
    root: PathBuf,
    manifest: StoreManifest,
}

impl StructuredStore {
    /// Opens the store at `dir`, failing if no completed build is there
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        let manifest_path = root.join(MANIFEST_FILE);
        if !manifest_path.is_file() {
            return Err(DeltaError::Store(format!(
                "No structured store at {}; run the ingest command first",
                root.display()
            )));
        }
        let manifest: StoreManifest =
            serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
        Ok(Self { root, manifest })
    }

    pub fn manifest(&self) -> &StoreManifest {
        &self.manifest
    }

    pub fn prefix_len(&self) -> usize {
        self.manifest.partition_prefix_len
    }

    pub fn partitions(&self) -> Vec<PartitionKey> {
        self.manifest
            .partitions
            .keys()
            .filter_map(|key| PartitionKey::new(key.clone()).ok())
            .collect()
    }

    pub fn contains_partition(&self, key: &PartitionKey) -> bool {
        self.manifest.partitions.contains_key(key.as_str())
    }

    pub fn record_count(&self, key: &PartitionKey) -> u64 {
        self.manifest
            .partitions
            .get(key.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn total_records(&self) -> u64 {
        self.manifest.total_records()
    }

    /// Opens a blocking reader; call from `spawn_blocking` in async code
    pub fn reader(&self, key: &PartitionKey) -> Result<PartitionReader> {
        PartitionReader::open(&partition_file(&self.root, key), key.clone())
    }

    /// Direct lookup of one entity, without scanning
    pub async fn get_record(&self, cnpj: &Cnpj) -> Result<Option<EntityRecord>> {
        let key = cnpj.partition(self.prefix_len());
        if !self.contains_partition(&key) {
            return Ok(None);
        }
        let reader = self.reader(&key)?;
        let cnpj = cnpj.clone();
        tokio::task::spawn_blocking(move || reader.get(&cnpj)).await?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_open_without_manifest_fails() {
        let temp = TempDir::new().unwrap();
        let err = StructuredStore::open(temp.path()).unwrap_err();
        assert!(matches!(err, DeltaError::Store(_)));
    }

    #[test]
    fn test_manifest_counts() {
        let temp = TempDir::new().unwrap();
        let manifest = StoreManifest {
            build_id: Uuid::new_v4(),
            built_at: Utc::now(),
            partition_prefix_len: 2,
            partitions: BTreeMap::from([("11".to_string(), 3), ("33".to_string(), 2)]),
            categories: BTreeMap::new(),
            orphan_establishments: 0,
        };
        std::fs::write(
            temp.path().join(MANIFEST_FILE),
            serde_json::to_vec(&manifest).unwrap(),
        )
        .unwrap();

        let store = StructuredStore::open(temp.path()).unwrap();
        assert_eq!(store.total_records(), 5);
        assert_eq!(store.partitions().len(), 2);
        assert_eq!(store.record_count(&PartitionKey::new("33").unwrap()), 2);
        assert_eq!(store.record_count(&PartitionKey::new("44").unwrap()), 0);
    }

    #[test]
    fn test_skip_rate() {
        let stats = CategoryStats {
            files: 1,
            total_rows: 200,
            skipped_rows: 3,
            fallback_decoded_rows: 0,
        };
        assert_eq!(stats.valid_rows(), 197);
        assert!((stats.skip_rate() - 0.015).abs() < f64::EPSILON);
    }
}
