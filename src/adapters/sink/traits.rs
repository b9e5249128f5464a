//! Shard destination abstraction
//!
//! The exporter hands every flushed shard to a [`ShardSink`] and commits the
//! shard to the hash cache only once `publish` has returned. Implementations
//! must therefore return from `publish` only after the shard is durable.

use crate::core::verification::checksum::payload_checksum;
use crate::domain::{Cnpj, PartitionKey, Period, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Builds the deterministic address of a shard
pub fn shard_key(period: &Period, partition: &PartitionKey, index: u32) -> String {
    format!("{period}/{partition}/{index:05}")
}

/// A canonical document ready for publication
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedDocument {
    pub cnpj: Cnpj,
    /// Compact canonical JSON, without a trailing newline
    pub json: String,
}

/// One shard as handed to a sink
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardPayload {
    pub key: String,
    pub period: Period,
    pub partition: PartitionKey,
    pub index: u32,
    pub documents: Vec<PublishedDocument>,
    pub tombstones: Vec<Cnpj>,
}

impl ShardPayload {
    /// Documents as newline-delimited JSON
    pub fn ndjson(&self) -> Vec<u8> {
        let size = self.documents.iter().map(|d| d.json.len() + 1).sum();
        let mut out = Vec::with_capacity(size);
        for doc in &self.documents {
            out.extend_from_slice(doc.json.as_bytes());
            out.push(b'\n');
        }
        out
    }

    /// SHA-256 over the NDJSON body followed by one tombstoned identifier per line
    pub fn checksum(&self) -> String {
        let mut bytes = self.ndjson();
        for cnpj in &self.tombstones {
            bytes.extend_from_slice(cnpj.as_str().as_bytes());
            bytes.push(b'\n');
        }
        payload_checksum(&bytes)
    }

    pub fn manifest(&self) -> ShardManifest {
        ShardManifest {
            key: self.key.clone(),
            period: self.period.to_string(),
            partition: self.partition.to_string(),
            index: self.index,
            document_count: self.documents.len(),
            tombstone_count: self.tombstones.len(),
            checksum: self.checksum(),
            tombstones: self.tombstones.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.tombstones.is_empty()
    }
}

/// Sidecar describing a published shard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardManifest {
    pub key: String,
    pub period: String,
    pub partition: String,
    pub index: u32,
    pub document_count: usize,
    pub tombstone_count: usize,
    pub checksum: String,
    pub tombstones: Vec<String>,
}

/// Destination of exported shards
#[async_trait]
pub trait ShardSink: Send + Sync {
    /// Persists a shard; returns only after the shard is durable
    ///
    /// Publishing a key again replaces the earlier shard under that key.
    async fn publish(&self, shard: &ShardPayload) -> Result<()>;

    /// Index following the last shard this sink holds for a period and partition
    ///
    /// Used when the hash cache cannot supply it. `None` means the sink cannot tell.
    async fn next_shard_index(
        &self,
        _period: &Period,
        _partition: &PartitionKey,
    ) -> Result<Option<u32>> {
        Ok(None)
    }

    /// Published canonical JSON of `cnpj` inside shard `key`, when retrievable
    async fn fetch_document(&self, _key: &str, _cnpj: &Cnpj) -> Result<Option<String>> {
        Ok(None)
    }
}
