//! Structured store builder
//!
//! A build runs in a sibling staging directory (`<store_dir>.building-<id>`)
//! and replaces the live store with a pair of renames only after every
//! category was read and every partition materialized. A failed build removes
//! its staging directory, so a partial store never becomes visible.

use super::parse::{CompanyRow, EstablishmentRow, PartnerRow, ReferenceRow, RowError, TaxRegimeRow};
use super::reader::{ExtractReader, FieldDecoder};
use super::reference::ReferenceTables;
use super::source::{SourceCategory, SourceInventory};
use crate::config::{DeltaConfig, IngestConfig};
use crate::core::store::{
    partition, partition_file, CategoryStats, MaterializeOutcome, PartitionWriter, StoreManifest,
    MANIFEST_FILE, PARTITIONS_DIR,
};
use crate::domain::{DeltaError, IngestionError, PartitionKey, Result};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Malformed rows logged individually per category before going quiet
const LOGGED_SKIPS_PER_CATEGORY: u64 = 10;

/// Outcome of a successful build
#[derive(Debug, Clone)]
pub struct IngestSummary {
    pub build_id: Uuid,
    pub categories: BTreeMap<SourceCategory, CategoryStats>,
    pub partitions: usize,
    pub records: u64,
    pub orphan_establishments: u64,
    pub duration: Duration,
}

impl IngestSummary {
    pub fn skipped_rows(&self) -> u64 {
        self.categories.values().map(|s| s.skipped_rows).sum()
    }

    pub fn log_summary(&self) {
        for (category, stats) in &self.categories {
            tracing::info!(
                category = %category,
                files = stats.files,
                rows = stats.total_rows,
                skipped = stats.skipped_rows,
                fallback_decoded = stats.fallback_decoded_rows,
                "Category ingested"
            );
        }
        tracing::info!(
            build_id = %self.build_id,
            partitions = self.partitions,
            records = self.records,
            orphan_establishments = self.orphan_establishments,
            duration_secs = self.duration.as_secs(),
            "Structured store built"
        );
    }
}

/// Builds the partitioned structured store from raw extracts
pub struct StoreBuilder {
    raw_dir: PathBuf,
    store_dir: PathBuf,
    ingest: IngestConfig,
    workers: usize,
}

impl StoreBuilder {
    pub fn new(config: &DeltaConfig) -> Self {
        Self {
            raw_dir: config.paths.raw_dir.clone(),
            store_dir: config.paths.store_dir.clone(),
            ingest: config.ingest.clone(),
            workers: config.export.workers,
        }
    }

    /// Runs a full build and swaps the result in as the live store
    pub async fn build(&self) -> Result<IngestSummary> {
        let started = Instant::now();
        let build_id = Uuid::new_v4();

        remove_stale_builds(&self.store_dir);
        let staging = sibling(&self.store_dir, &format!("building-{build_id}"));

        tracing::info!(
            build_id = %build_id,
            raw_dir = %self.raw_dir.display(),
            staging = %staging.display(),
            "Starting structured store build"
        );

        let manifest = match self.build_into(&staging, build_id).await {
            Ok(manifest) => manifest,
            Err(e) => {
                if let Err(cleanup) = std::fs::remove_dir_all(&staging) {
                    tracing::warn!(error = %cleanup, "Failed to remove staging directory");
                }
                return Err(e);
            }
        };

        self.swap_in(&staging, build_id)?;

        let categories = manifest
            .categories
            .iter()
            .filter_map(|(name, stats)| {
                SourceCategory::ALL
                    .into_iter()
                    .find(|c| c.name() == name.as_str())
                    .map(|c| (c, stats.clone()))
            })
            .collect();

        let summary = IngestSummary {
            build_id,
            categories,
            partitions: manifest.partitions.len(),
            records: manifest.total_records(),
            orphan_establishments: manifest.orphan_establishments,
            duration: started.elapsed(),
        };
        summary.log_summary();
        Ok(summary)
    }

    async fn build_into(&self, staging: &Path, build_id: Uuid) -> Result<StoreManifest> {
        let inventory = SourceInventory::discover(&self.raw_dir)?;
        inventory.check_required()?;

        let partitions_dir = staging.join(PARTITIONS_DIR);
        std::fs::create_dir_all(&partitions_dir)?;

        let stager = Stager {
            partitions_dir,
            ingest: self.ingest.clone(),
        };
        let staged = tokio::task::spawn_blocking(move || stager.run(&inventory)).await??;

        let refs = Arc::new(staged.refs);
        let staging_root = staging.to_path_buf();
        let outcomes: Vec<Result<(PartitionKey, MaterializeOutcome)>> =
            stream::iter(staged.partitions)
                .map(|key| {
                    let refs = Arc::clone(&refs);
                    let path = partition_file(&staging_root, &key);
                    async move {
                        let outcome = tokio::task::spawn_blocking(move || {
                            partition::materialize(&path, &refs)
                        })
                        .await??;
                        Ok::<_, DeltaError>((key, outcome))
                    }
                })
                .buffer_unordered(self.workers.max(1))
                .collect()
                .await;

        let mut partitions = BTreeMap::new();
        let mut orphan_establishments = 0;
        for outcome in outcomes {
            let (key, outcome) = outcome?;
            orphan_establishments += outcome.orphans;
            if outcome.records == 0 {
                // Roots with companies or partners but no establishment
                std::fs::remove_file(partition_file(staging, &key))?;
                continue;
            }
            tracing::debug!(partition = %key, records = outcome.records, "Partition materialized");
            partitions.insert(key.to_string(), outcome.records);
        }

        if orphan_establishments > 0 {
            tracing::warn!(
                count = orphan_establishments,
                "Establishments without a company row were kept with empty company data"
            );
        }

        let manifest = StoreManifest {
            build_id,
            built_at: Utc::now(),
            partition_prefix_len: self.ingest.partition_prefix_len,
            partitions,
            categories: staged
                .categories
                .iter()
                .map(|(c, s)| (c.name().to_string(), s.clone()))
                .collect(),
            orphan_establishments,
        };
        std::fs::write(
            staging.join(MANIFEST_FILE),
            serde_json::to_vec_pretty(&manifest)?,
        )?;

        Ok(manifest)
    }

    /// Replaces the live store with the staging directory
    fn swap_in(&self, staging: &Path, build_id: Uuid) -> Result<()> {
        let previous = if self.store_dir.exists() {
            let previous = sibling(&self.store_dir, &format!("previous-{build_id}"));
            std::fs::rename(&self.store_dir, &previous)?;
            Some(previous)
        } else {
            if let Some(parent) = self.store_dir.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            None
        };

        if let Err(e) = std::fs::rename(staging, &self.store_dir) {
            if let Some(previous) = &previous {
                let _ = std::fs::rename(previous, &self.store_dir);
            }
            return Err(DeltaError::Store(format!(
                "Failed to activate new store at {}: {e}",
                self.store_dir.display()
            )));
        }

        if let Some(previous) = previous {
            if let Err(e) = std::fs::remove_dir_all(&previous) {
                tracing::warn!(
                    path = %previous.display(),
                    error = %e,
                    "Failed to remove previous store"
                );
            }
        }
        Ok(())
    }
}

fn sibling(store_dir: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = store_dir
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("store"));
    name.push(".");
    name.push(suffix);
    store_dir.with_file_name(name)
}

/// Removes staging directories left behind by crashed builds
fn remove_stale_builds(store_dir: &Path) {
    let Some(name) = store_dir.file_name().and_then(|n| n.to_str()) else {
        return;
    };
    let prefix = format!("{name}.building-");
    let parent = match store_dir.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let Ok(entries) = std::fs::read_dir(&parent) else {
        return;
    };
    for entry in entries.flatten() {
        let stale = entry
            .file_name()
            .to_str()
            .map(|n| n.starts_with(&prefix))
            .unwrap_or(false);
        if stale {
            tracing::info!(path = %entry.path().display(), "Removing stale build directory");
            let _ = std::fs::remove_dir_all(entry.path());
        }
    }
}

struct Staged {
    refs: ReferenceTables,
    categories: BTreeMap<SourceCategory, CategoryStats>,
    partitions: Vec<PartitionKey>,
}

/// Staging writers held open at once; beyond this the least recently used is closed
const MAX_OPEN_WRITERS: usize = 64;

struct OpenWriter {
    writer: PartitionWriter,
    last_used: u64,
}

/// Lazily opened staging writers, one per partition
///
/// At most `max_open` connections stay open. A closed writer commits its rows
/// and is reopened on demand, appending to the same staging tables.
struct PartitionWriters {
    dir: PathBuf,
    prefix_len: usize,
    commit_interval: usize,
    max_open: usize,
    open: BTreeMap<PartitionKey, OpenWriter>,
    seen: BTreeSet<PartitionKey>,
    tick: u64,
}

impl PartitionWriters {
    fn new(dir: PathBuf, ingest: &IngestConfig, max_open: usize) -> Self {
        Self {
            dir,
            prefix_len: ingest.partition_prefix_len,
            commit_interval: ingest.commit_interval_rows,
            max_open: max_open.max(1),
            open: BTreeMap::new(),
            seen: BTreeSet::new(),
            tick: 0,
        }
    }

    fn for_root(&mut self, root: &str) -> Result<&mut PartitionWriter> {
        let key = PartitionKey::for_root(root, self.prefix_len);
        if !self.open.contains_key(&key) && self.open.len() >= self.max_open {
            self.close_least_recent()?;
        }

        self.tick += 1;
        let tick = self.tick;
        let open = match self.open.entry(key) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let path = self.dir.join(format!("{}.db", entry.key()));
                let writer = PartitionWriter::create(&path, self.commit_interval)?;
                self.seen.insert(entry.key().clone());
                entry.insert(OpenWriter {
                    writer,
                    last_used: tick,
                })
            }
        };
        open.last_used = tick;
        Ok(&mut open.writer)
    }

    fn close_least_recent(&mut self) -> Result<()> {
        let Some(key) = self
            .open
            .iter()
            .min_by_key(|(_, open)| open.last_used)
            .map(|(key, _)| key.clone())
        else {
            return Ok(());
        };
        if let Some(open) = self.open.remove(&key) {
            tracing::trace!(partition = %key, "Closing least recently used staging writer");
            open.writer.finish()?;
        }
        Ok(())
    }

    fn finish(self) -> Result<Vec<PartitionKey>> {
        for open in self.open.into_values() {
            open.writer.finish()?;
        }
        Ok(self.seen.into_iter().collect())
    }
}

/// Blocking half of the build: reads every category and stages rows
struct Stager {
    partitions_dir: PathBuf,
    ingest: IngestConfig,
}

impl Stager {
    fn run(self, inventory: &SourceInventory) -> Result<Staged> {
        let decoder = FieldDecoder::for_label(&self.ingest.encoding)?;
        let mut categories = BTreeMap::new();

        let mut refs = ReferenceTables::default();
        for category in SourceCategory::REFERENCE {
            let stats = self.read_category(
                inventory,
                category,
                decoder,
                |fields| ReferenceRow::parse(category, fields),
                |row| {
                    refs.insert(category, row.code, row.description);
                    Ok(())
                },
            )?;
            categories.insert(category, stats);
        }

        let mut writers =
            PartitionWriters::new(self.partitions_dir.clone(), &self.ingest, MAX_OPEN_WRITERS);

        let stats = self.read_category(
            inventory,
            SourceCategory::Companies,
            decoder,
            CompanyRow::parse,
            |row| writers.for_root(row.root.as_str())?.stage_company(&row),
        )?;
        categories.insert(SourceCategory::Companies, stats);

        if !inventory.files(SourceCategory::TaxRegimes).is_empty() {
            let stats = self.read_category(
                inventory,
                SourceCategory::TaxRegimes,
                decoder,
                TaxRegimeRow::parse,
                |row| writers.for_root(row.root.as_str())?.stage_tax_regime(&row),
            )?;
            categories.insert(SourceCategory::TaxRegimes, stats);
        }

        let stats = self.read_category(
            inventory,
            SourceCategory::Partners,
            decoder,
            PartnerRow::parse,
            |row| writers.for_root(row.root.as_str())?.stage_partner(&row),
        )?;
        categories.insert(SourceCategory::Partners, stats);

        let stats = self.read_category(
            inventory,
            SourceCategory::Establishments,
            decoder,
            EstablishmentRow::parse,
            |row| writers.for_root(row.cnpj.root())?.stage_establishment(&row),
        )?;
        categories.insert(SourceCategory::Establishments, stats);

        let partitions = writers.finish()?;
        Ok(Staged {
            refs,
            categories,
            partitions,
        })
    }

    /// Streams every file of a category through `parse` and `sink`
    ///
    /// Rows `parse` rejects are skipped and counted; `sink` errors abort the build.
    fn read_category<T>(
        &self,
        inventory: &SourceInventory,
        category: SourceCategory,
        decoder: FieldDecoder,
        parse: impl Fn(&[String]) -> std::result::Result<T, RowError>,
        mut sink: impl FnMut(T) -> Result<()>,
    ) -> Result<CategoryStats> {
        let files = inventory.files(category);
        let mut stats = CategoryStats {
            files: files.len(),
            ..CategoryStats::default()
        };

        for path in files {
            tracing::info!(category = %category, file = %path.display(), "Reading extract");
            let mut reader = ExtractReader::open(path, decoder)?;
            while let Some(row) = reader.next_row()? {
                stats.total_rows += 1;
                if row.fallback_decoded {
                    stats.fallback_decoded_rows += 1;
                }
                match parse(&row.fields) {
                    Ok(parsed) => sink(parsed)?,
                    Err(e) => {
                        stats.skipped_rows += 1;
                        if stats.skipped_rows <= LOGGED_SKIPS_PER_CATEGORY {
                            tracing::warn!(
                                category = %category,
                                file = %reader.path().display(),
                                line = row.line,
                                error = %e,
                                "Skipping malformed row"
                            );
                        }
                    }
                }
            }
        }

        self.enforce(category, &stats)?;
        Ok(stats)
    }

    fn enforce(&self, category: SourceCategory, stats: &CategoryStats) -> Result<()> {
        if stats.skip_rate() > self.ingest.max_skip_rate {
            return Err(IngestionError::SkipRateExceeded {
                category: category.to_string(),
                skipped: stats.skipped_rows,
                total: stats.total_rows,
                threshold: self.ingest.max_skip_rate,
            }
            .into());
        }
        if stats.valid_rows() == 0 {
            if category.is_required() {
                return Err(IngestionError::EmptyCategory(category.to_string()).into());
            }
            tracing::warn!(category = %category, "Optional category has no valid rows");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sibling_paths() {
        assert_eq!(
            sibling(Path::new("/data/store"), "building-x"),
            PathBuf::from("/data/store.building-x")
        );
        assert_eq!(
            sibling(Path::new("store"), "previous-y"),
            PathBuf::from("store.previous-y")
        );
    }

    fn company(root: &str) -> CompanyRow {
        let fields: Vec<String> = [root, "EMPRESA", "2062", "49", "1000,00", "01", ""]
            .iter()
            .map(|f| f.to_string())
            .collect();
        CompanyRow::parse(&fields).unwrap()
    }

    fn staged_companies(path: &Path) -> i64 {
        let conn = rusqlite::Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM stage_companies", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_writers_stay_under_open_limit() {
        let temp = TempDir::new().unwrap();
        let ingest = IngestConfig::default();
        let mut writers = PartitionWriters::new(temp.path().to_path_buf(), &ingest, 2);

        for root in ["11222333", "22333444", "33444555", "44555666", "11999888", "22000111"] {
            writers.for_root(root).unwrap().stage_company(&company(root)).unwrap();
            assert!(writers.open.len() <= 2);
        }
        let keys = writers.finish().unwrap();

        let names: Vec<&str> = keys.iter().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["11", "22", "33", "44"]);
        assert_eq!(staged_companies(&temp.path().join("11.db")), 2);
        assert_eq!(staged_companies(&temp.path().join("22.db")), 2);
        assert_eq!(staged_companies(&temp.path().join("33.db")), 1);
        assert_eq!(staged_companies(&temp.path().join("44.db")), 1);
    }

    #[test]
    fn test_remove_stale_builds() {
        let temp = TempDir::new().unwrap();
        let store = temp.path().join("store");
        std::fs::create_dir_all(temp.path().join("store.building-old")).unwrap();
        std::fs::create_dir_all(temp.path().join("store-keep")).unwrap();

        remove_stale_builds(&store);

        assert!(!temp.path().join("store.building-old").exists());
        assert!(temp.path().join("store-keep").exists());
    }
}
