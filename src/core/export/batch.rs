//! Shard accumulation
//!
//! Documents and tombstones of one partition are gathered into shards of at
//! most `shard_size` items. Indexes are consecutive from the first index the
//! hash cache hands out for the period, so shard keys are reproducible.

use crate::adapters::sink::{shard_key, PublishedDocument, ShardPayload};
use crate::core::state::{ShardCommit, ShardLogEntry};
use crate::core::transform::RenderedDocument;
use crate::domain::{Cnpj, PartitionKey, Period};
use chrono::Utc;

/// A full shard, ready to publish and commit
#[derive(Debug, Clone)]
pub struct ExportShard {
    pub payload: ShardPayload,
    /// Content hash of every document, in payload order
    pub hashes: Vec<(Cnpj, String)>,
}

impl ExportShard {
    pub fn key(&self) -> &str {
        &self.payload.key
    }

    pub fn document_count(&self) -> usize {
        self.payload.documents.len()
    }

    pub fn tombstone_count(&self) -> usize {
        self.payload.tombstones.len()
    }

    /// Cache changes to apply once the payload is durable
    pub fn into_commit(self) -> ShardCommit {
        let checksum = self.payload.checksum();
        ShardCommit {
            log: ShardLogEntry {
                period: self.payload.period.to_string(),
                shard_index: self.payload.index,
                key: self.payload.key.clone(),
                document_count: self.payload.documents.len(),
                tombstone_count: self.payload.tombstones.len(),
                checksum,
                committed_at: Utc::now(),
            },
            documents: self.hashes,
            tombstones: self.payload.tombstones,
        }
    }
}

/// Collects one partition's output into consecutive shards
pub struct ShardAccumulator {
    period: Period,
    partition: PartitionKey,
    shard_size: usize,
    next_index: u32,
    documents: Vec<PublishedDocument>,
    hashes: Vec<(Cnpj, String)>,
    tombstones: Vec<Cnpj>,
}

impl ShardAccumulator {
    pub fn new(period: Period, partition: PartitionKey, shard_size: usize, first_index: u32) -> Self {
        Self {
            period,
            partition,
            shard_size: shard_size.max(1),
            next_index: first_index,
            documents: Vec::new(),
            hashes: Vec::new(),
            tombstones: Vec::new(),
        }
    }

    /// Index the next emitted shard will carry
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    fn pending(&self) -> usize {
        self.documents.len() + self.tombstones.len()
    }

    /// Adds a new or modified document; returns a shard once full
    pub fn push_document(&mut self, rendered: RenderedDocument) -> Option<ExportShard> {
        self.hashes.push((rendered.cnpj.clone(), rendered.hash));
        self.documents.push(PublishedDocument {
            cnpj: rendered.cnpj,
            json: rendered.json,
        });
        self.take_if_full()
    }

    /// Adds a removed identifier; returns a shard once full
    pub fn push_tombstone(&mut self, cnpj: Cnpj) -> Option<ExportShard> {
        self.tombstones.push(cnpj);
        self.take_if_full()
    }

    /// Emits whatever is pending as a final, possibly short, shard
    pub fn finish(&mut self) -> Option<ExportShard> {
        if self.pending() == 0 {
            None
        } else {
            Some(self.take())
        }
    }

    fn take_if_full(&mut self) -> Option<ExportShard> {
        if self.pending() >= self.shard_size {
            Some(self.take())
        } else {
            None
        }
    }

    fn take(&mut self) -> ExportShard {
        let index = self.next_index;
        self.next_index += 1;
        ExportShard {
            payload: ShardPayload {
                key: shard_key(&self.period, &self.partition, index),
                period: self.period.clone(),
                partition: self.partition.clone(),
                index,
                documents: std::mem::take(&mut self.documents),
                tombstones: std::mem::take(&mut self.tombstones),
            },
            hashes: std::mem::take(&mut self.hashes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rendered(id: &str) -> RenderedDocument {
        RenderedDocument {
            cnpj: Cnpj::new(id).unwrap(),
            json: format!("{{\"cnpj\":\"{id}\"}}"),
            hash: format!("{:016x}", id.len()),
        }
    }

    fn accumulator(size: usize, first: u32) -> ShardAccumulator {
        ShardAccumulator::new(
            Period::new("2025-04").unwrap(),
            PartitionKey::new("11").unwrap(),
            size,
            first,
        )
    }

    #[test]
    fn test_full_shards_are_emitted_in_order() {
        let mut acc = accumulator(2, 5);
        assert!(acc.push_document(rendered("11222333000181")).is_none());
        let shard = acc.push_document(rendered("11222333000262")).unwrap();

        assert_eq!(shard.key(), "2025-04/11/00005");
        assert_eq!(shard.document_count(), 2);
        assert_eq!(shard.hashes.len(), 2);
        assert_eq!(acc.next_index(), 6);
        assert!(acc.finish().is_none());
    }

    #[test]
    fn test_tombstones_share_the_open_shard() {
        let mut acc = accumulator(3, 0);
        acc.push_document(rendered("11222333000181"));
        acc.push_tombstone(Cnpj::new("11999888000100").unwrap());
        let last = acc.finish().unwrap();

        assert_eq!(last.key(), "2025-04/11/00000");
        assert_eq!(last.document_count(), 1);
        assert_eq!(last.tombstone_count(), 1);
    }

    #[test]
    fn test_commit_carries_log_and_hashes() {
        let mut acc = accumulator(1, 2);
        let shard = acc.push_document(rendered("11222333000181")).unwrap();
        let checksum = shard.payload.checksum();
        let commit = shard.into_commit();

        assert_eq!(commit.log.shard_index, 2);
        assert_eq!(commit.log.key, "2025-04/11/00002");
        assert_eq!(commit.log.checksum, checksum);
        assert_eq!(commit.documents[0].0.as_str(), "11222333000181");
        assert!(commit.tombstones.is_empty());
    }
}
