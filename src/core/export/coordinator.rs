//! Export coordinator - main orchestrator for the export process
//!
//! This module coordinates the change-detection export: scanning the
//! structured store partition by partition, diffing canonical hashes against
//! the hash cache, publishing shards through the sink and committing them to
//! the cache once durable.

use crate::adapters::sink::local::write_durably;
use crate::adapters::sink::{create_sink, ShardPayload, ShardSink};
use crate::config::DeltaConfig;
use crate::core::export::batch::{ExportShard, ShardAccumulator};
use crate::core::export::diff::{ChangeKind, KnownHashes};
use crate::core::export::summary::{
    ExportError, ExportErrorType, ExportSummary, PartitionResult,
};
use crate::core::state::HashCache;
use crate::core::store::{PartitionReader, StructuredStore};
use crate::core::transform::{render, RenderedDocument};
use crate::core::verification::{IntegritySampler, VerificationReport};
use crate::domain::{Cnpj, DeltaError, PartitionKey, Period, Result};
use crate::{log_partition_complete, log_retry_attempt, log_shard_published};
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Export coordinator
pub struct ExportCoordinator {
    config: DeltaConfig,
    period: Period,
    dry_run: bool,
    store: Arc<StructuredStore>,
    cache: Arc<HashCache>,
    sink: Arc<dyn ShardSink>,
    shutdown: watch::Receiver<bool>,
}

impl ExportCoordinator {
    /// Create a coordinator publishing to the configured sink
    pub fn new(config: DeltaConfig, shutdown: watch::Receiver<bool>) -> Result<Self> {
        let sink = create_sink(&config);
        Self::with_sink(config, sink, shutdown)
    }

    /// Create a coordinator publishing to `sink`
    ///
    /// # Errors
    ///
    /// Fails when no store has been built, when the store or the cache were
    /// written with a different partition prefix length than configured, or
    /// when the configured period is invalid.
    pub fn with_sink(
        config: DeltaConfig,
        sink: Arc<dyn ShardSink>,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let period = config.period().map_err(DeltaError::Configuration)?;
        let store = StructuredStore::open(&config.paths.store_dir)?;
        if store.prefix_len() != config.ingest.partition_prefix_len {
            return Err(DeltaError::Configuration(format!(
                "Structured store was built with partition prefix length {}, but {} is configured; re-run ingest",
                store.prefix_len(),
                config.ingest.partition_prefix_len
            )));
        }
        let cache = HashCache::open(&config.paths.cache_dir, store.prefix_len())?;

        Ok(Self {
            dry_run: config.is_dry_run(),
            config,
            period,
            store: Arc::new(store),
            cache: Arc::new(cache),
            sink,
            shutdown,
        })
    }

    pub fn period(&self) -> &Period {
        &self.period
    }

    pub fn store(&self) -> &Arc<StructuredStore> {
        &self.store
    }

    pub fn cache(&self) -> &Arc<HashCache> {
        &self.cache
    }

    fn shutdown_requested(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Execute the export
    ///
    /// Partitions are the union of store and cache partitions, so a partition
    /// that vanished from the store still produces its tombstones. Partitions
    /// run concurrently on `export.workers` tasks; a failing partition is
    /// recorded in the summary and does not stop the others.
    pub async fn execute_export(&self) -> Result<ExportSummary> {
        let start_time = Instant::now();
        let mut summary = ExportSummary::new(self.period.as_str(), self.dry_run);

        let partitions = self.partitions_to_process()?;
        tracing::info!(
            period = %self.period,
            partitions = partitions.len(),
            workers = self.config.export.workers,
            dry_run = self.dry_run,
            "Starting export process"
        );

        let mut results: Vec<(PartitionKey, Result<PartitionResult>)> = stream::iter(partitions)
            .map(|key| async move {
                let result = self.export_partition(&key).await;
                (key, result)
            })
            .buffer_unordered(self.config.export.workers.max(1))
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        for (key, result) in results {
            match result {
                Ok(result) => summary.add_partition(&result),
                Err(e) => {
                    tracing::error!(partition = %key, error = %e, "Partition export failed");
                    summary.add_partition_failure(&key, &e);
                }
            }
        }

        if self.config.verification.enable_verification && !self.dry_run && !summary.interrupted
        {
            match self.verify().await {
                Ok(report) => {
                    tracing::info!(
                        total_verified = report.total_verified,
                        passed = report.passed,
                        failed = report.failed,
                        success_rate = format!("{:.2}%", report.success_rate()),
                        "Verification completed"
                    );
                    for failure in &report.failures {
                        tracing::warn!(
                            cnpj = %failure.cnpj,
                            reason = %failure.kind,
                            "Verification failure"
                        );
                    }
                    summary.set_verification_report(report);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Verification failed");
                    summary.add_error(ExportError::new(
                        ExportErrorType::Verification,
                        format!("Verification failed: {e}"),
                    ));
                }
            }
        }

        summary = summary.with_duration(start_time.elapsed());
        summary.log_summary();
        Ok(summary)
    }

    /// Sample exported entities against store, cache and sink
    pub async fn verify(&self) -> Result<VerificationReport> {
        IntegritySampler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.cache),
            Arc::clone(&self.sink),
            &self.config.verification,
        )
        .run()
        .await
    }

    /// Write the canonical document of one entity to `<dir>/<cnpj>.json`
    ///
    /// Uses a direct partition lookup. Returns `None` when the entity is not
    /// in the store. The hash cache is not touched.
    pub async fn export_single(&self, cnpj: &Cnpj, dir: &Path) -> Result<Option<PathBuf>> {
        let Some(record) = self.store.get_record(cnpj).await? else {
            tracing::warn!(cnpj = %cnpj, "Entity not found in structured store");
            return Ok(None);
        };
        let rendered = render(&record)?;
        let path = dir.join(format!("{cnpj}.json"));
        write_durably(&path, rendered.json.as_bytes()).await?;
        tracing::info!(cnpj = %cnpj, path = %path.display(), hash = %rendered.hash, "Single entity exported");
        Ok(Some(path))
    }

    fn partitions_to_process(&self) -> Result<Vec<PartitionKey>> {
        let mut keys: BTreeSet<PartitionKey> = self.store.partitions().into_iter().collect();
        keys.extend(self.cache.partitions()?);
        Ok(keys.into_iter().collect())
    }

    async fn export_partition(&self, key: &PartitionKey) -> Result<PartitionResult> {
        let mut result = PartitionResult::new(key.clone());
        if self.shutdown_requested() {
            result.interrupted = true;
            return Ok(result);
        }

        let mut known = match self.cache.lookup_partition(key).await {
            Ok(hashes) => KnownHashes::new(hashes),
            Err(e) => {
                tracing::warn!(
                    partition = %key,
                    error = %e,
                    "Hash cache unreadable; re-exporting partition without removal detection"
                );
                result.cache_fallback = true;
                KnownHashes::default()
            }
        };

        let first_index = if result.cache_fallback {
            self.fallback_shard_index(key).await?
        } else {
            self.cache.next_shard_index(key, &self.period).await?
        };
        let mut shards = ShardAccumulator::new(
            self.period.clone(),
            key.clone(),
            self.config.export.shard_size,
            first_index,
        );
        tracing::debug!(
            partition = %key,
            known = known.len(),
            first_index,
            "Scanning partition"
        );

        if self.store.contains_partition(key) {
            let page_size = self.config.export.page_size.max(1);
            let mut reader = self.store.reader(key)?;
            let mut after: Option<Cnpj> = None;
            loop {
                let (back, page) = render_page(reader, after.take(), page_size).await?;
                reader = back;
                let last_page = page.len() < page_size;
                after = page.last().map(|doc| doc.cnpj.clone());

                for doc in page {
                    result.scanned += 1;
                    match known.observe(&doc.cnpj, &doc.hash) {
                        ChangeKind::Unchanged => {
                            result.unchanged += 1;
                            continue;
                        }
                        ChangeKind::New => result.new += 1,
                        ChangeKind::Modified => result.modified += 1,
                    }
                    if let Some(shard) = shards.push_document(doc) {
                        if !self.flush(shard, &mut result).await? {
                            return Ok(result);
                        }
                    }
                }

                if last_page {
                    break;
                }
            }
        }

        if !result.cache_fallback {
            for cnpj in known.into_removed() {
                result.removed += 1;
                if let Some(shard) = shards.push_tombstone(cnpj) {
                    if !self.flush(shard, &mut result).await? {
                        return Ok(result);
                    }
                }
            }
        }

        if let Some(shard) = shards.finish() {
            if !self.flush(shard, &mut result).await? {
                return Ok(result);
            }
        }

        log_partition_complete!(key, result);
        Ok(result)
    }

    /// First shard index when the cache cannot be trusted
    ///
    /// Takes the highest index known to either the cache or the sink so a
    /// re-export never overwrites a published shard.
    async fn fallback_shard_index(&self, key: &PartitionKey) -> Result<u32> {
        let from_cache = match self.cache.next_shard_index(key, &self.period).await {
            Ok(index) => Some(index),
            Err(e) => {
                tracing::debug!(partition = %key, error = %e, "Shard index unavailable from cache");
                None
            }
        };
        let from_sink = self.sink.next_shard_index(&self.period, key).await?;
        match from_cache.into_iter().chain(from_sink).max() {
            Some(index) => Ok(index),
            None => {
                tracing::warn!(
                    partition = %key,
                    "No shard index available from cache or sink; starting at 0"
                );
                Ok(0)
            }
        }
    }

    /// Publishes and commits a shard; returns false when a shutdown discarded it
    ///
    /// While the cache is in fallback a failed commit is recorded on the
    /// result and publishing continues.

    async fn flush(&self, shard: ExportShard, result: &mut PartitionResult) -> Result<bool> {
        if self.shutdown_requested() {
            tracing::info!(
                partition = %result.partition,
                shard = %shard.key(),
                "Shutdown requested, discarding in-progress shard"
            );
            result.interrupted = true;
            return Ok(false);
        }

        let documents = shard.document_count() as u64;
        let tombstones = shard.tombstone_count() as u64;

        if self.dry_run {
            tracing::debug!(
                shard = %shard.key(),
                documents,
                tombstones,
                "Dry run, shard not published"
            );
        } else {
            self.publish_with_retry(&shard.payload).await?;
            let key = shard.key().to_string();
            match self
                .cache
                .commit_shard(&result.partition, shard.into_commit())
                .await
            {
                Ok(()) => log_shard_published!(key, documents, tombstones),
                Err(e) if result.cache_fallback => {
                    tracing::warn!(
                        partition = %result.partition,
                        shard = %key,
                        error = %e,
                        "Shard published but not committed to hash cache"
                    );
                    result.commit_error.get_or_insert_with(|| e.to_string());
                }
                Err(e) => return Err(e),
            }
        }

        result.shards_published += 1;
        result.documents_published += documents;
        result.tombstones_published += tombstones;
        Ok(true)
    }

    async fn publish_with_retry(&self, payload: &ShardPayload) -> Result<()> {
        let max_retries = self.config.export.max_retries;
        let backoff = &self.config.export.retry_backoff_ms;
        let mut attempt = 0;

        loop {
            match self.sink.publish(payload).await {
                Ok(()) => return Ok(()),
                Err(e) if attempt < max_retries => {
                    attempt += 1;
                    log_retry_attempt!(attempt, max_retries, e);
                    let delay_ms = backoff
                        .get(attempt - 1)
                        .or_else(|| backoff.last())
                        .copied()
                        .unwrap_or(0);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
                Err(e) => {
                    return Err(DeltaError::Upload(format!(
                        "Shard {} not published after {} attempt(s): {e}",
                        payload.key,
                        attempt + 1
                    )))
                }
            }
        }
    }
}

/// Reads and renders one page off the async runtime; hands the reader back
async fn render_page(
    reader: PartitionReader,
    after: Option<Cnpj>,
    limit: usize,
) -> Result<(PartitionReader, Vec<RenderedDocument>)> {
    tokio::task::spawn_blocking(move || -> Result<(PartitionReader, Vec<RenderedDocument>)> {
        let documents = reader
            .read_page(after.as_ref(), limit)?
            .iter()
            .map(render)
            .collect::<Result<Vec<_>>>()?;
        Ok((reader, documents))
    })
    .await?
}
