//! Post-export integrity sampling
//!
//! Draws random identifiers from the structured store, weighted by partition
//! record count, plus one entity with partners and one with a tax-regime
//! record when the store has them. Each sampled entity is re-rendered from
//! the store and compared with the hash committed in the cache and, when the
//! sink can serve it, with the published document.

use crate::adapters::sink::ShardSink;
use crate::config::VerificationConfig;
use crate::core::state::HashCache;
use crate::core::store::{Coverage, PartitionReader, StructuredStore};
use crate::core::transform::render;
use crate::core::verification::report::{MismatchKind, VerificationFailure, VerificationReport};
use crate::domain::{Cnpj, DeltaError, PartitionKey, Result};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Integrity sampler over a store, its hash cache and the shard sink
pub struct IntegritySampler {
    store: Arc<StructuredStore>,
    cache: Arc<HashCache>,
    sink: Arc<dyn ShardSink>,
    sample_size: usize,
    compare_published: bool,
    seed: Option<u64>,
}

impl IntegritySampler {
    pub fn new(
        store: Arc<StructuredStore>,
        cache: Arc<HashCache>,
        sink: Arc<dyn ShardSink>,
        config: &VerificationConfig,
    ) -> Self {
        Self {
            store,
            cache,
            sink,
            sample_size: config.sample_size,
            compare_published: config.compare_published,
            seed: config.seed,
        }
    }

    /// Samples and checks; mismatches are reported, never raised
    ///
    /// # Errors
    ///
    /// Returns an error only when the store or cache cannot be read at all.
    pub async fn run(&self) -> Result<VerificationReport> {
        let start = Instant::now();
        let mut report = VerificationReport::new();

        let store = Arc::clone(&self.store);
        let (sample_size, seed) = (self.sample_size, self.seed);
        let sample =
            tokio::task::spawn_blocking(move || pick_sample(&store, sample_size, seed)).await??;

        tracing::info!(sampled = sample.len(), "Starting integrity sampling");

        for cnpj in &sample {
            self.check(cnpj, &mut report).await?;
        }

        report.set_duration(start.elapsed().as_millis() as u64);
        Ok(report)
    }

    async fn check(&self, cnpj: &Cnpj, report: &mut VerificationReport) -> Result<()> {
        let entry = self.cache.entry(cnpj).await?.filter(|e| e.is_live());
        let expected_hash = entry.as_ref().map(|e| e.hash.clone());

        let Some(record) = self.store.get_record(cnpj).await? else {
            report.record_failure(VerificationFailure {
                cnpj: cnpj.clone(),
                kind: MismatchKind::MissingFromStore,
                expected_hash,
                actual_hash: None,
            });
            return Ok(());
        };
        let rendered = render(&record)?;

        let Some(entry) = entry else {
            report.record_failure(VerificationFailure {
                cnpj: cnpj.clone(),
                kind: MismatchKind::NotCommitted,
                expected_hash: None,
                actual_hash: Some(rendered.hash),
            });
            return Ok(());
        };

        if entry.hash != rendered.hash {
            report.record_failure(VerificationFailure {
                cnpj: cnpj.clone(),
                kind: MismatchKind::HashMismatch,
                expected_hash: Some(entry.hash),
                actual_hash: Some(rendered.hash),
            });
            return Ok(());
        }

        let mut compared = false;
        if self.compare_published {
            if let Some(key) = &entry.shard_key {
                if let Some(published) = self.sink.fetch_document(key, cnpj).await? {
                    compared = true;
                    if published != rendered.json {
                        report.record_failure(VerificationFailure {
                            cnpj: cnpj.clone(),
                            kind: MismatchKind::PublishedMismatch,
                            expected_hash: Some(entry.hash),
                            actual_hash: Some(rendered.hash),
                        });
                        return Ok(());
                    }
                }
            }
        }

        report.record_pass(compared);
        Ok(())
    }
}

fn reader_for<'a>(
    readers: &'a mut HashMap<PartitionKey, PartitionReader>,
    store: &StructuredStore,
    key: &PartitionKey,
) -> Result<&'a PartitionReader> {
    if !readers.contains_key(key) {
        readers.insert(key.clone(), store.reader(key)?);
    }
    readers
        .get(key)
        .ok_or_else(|| DeltaError::Store(format!("Reader for partition {key} not available")))
}

/// Weighted random identifiers plus coverage picks, sorted and deduplicated
fn pick_sample(store: &StructuredStore, sample_size: usize, seed: Option<u64>) -> Result<Vec<Cnpj>> {
    let mut rng = match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let weighted: Vec<(PartitionKey, u64)> = store
        .partitions()
        .into_iter()
        .map(|key| {
            let count = store.record_count(&key);
            (key, count)
        })
        .filter(|(_, count)| *count > 0)
        .collect();
    if weighted.is_empty() {
        return Ok(Vec::new());
    }

    let total: u64 = weighted.iter().map(|(_, count)| count).sum();
    let target = sample_size.min(total as usize);
    let distribution = WeightedIndex::new(weighted.iter().map(|(_, count)| *count))
        .map_err(|e| DeltaError::Validation(format!("Cannot weight partitions: {e}")))?;

    let mut readers = HashMap::new();
    let mut picked = BTreeSet::new();
    let mut attempts = 0;
    while picked.len() < target && attempts < target * 10 {
        attempts += 1;
        let (key, count) = &weighted[distribution.sample(&mut rng)];
        let offset = rng.gen_range(0..*count);
        if let Some(id) = reader_for(&mut readers, store, key)?.id_at(offset)? {
            picked.insert(id);
        }
    }

    let mut order: Vec<usize> = (0..weighted.len()).collect();
    order.shuffle(&mut rng);
    for coverage in [Coverage::Partners, Coverage::TaxRegime] {
        for &i in &order {
            let reader = reader_for(&mut readers, store, &weighted[i].0)?;
            let available = reader.count_with(coverage)?;
            if available == 0 {
                continue;
            }
            if let Some(id) = reader.id_with_at(coverage, rng.gen_range(0..available))? {
                picked.insert(id);
            }
            break;
        }
    }

    Ok(picked.into_iter().collect())
}
