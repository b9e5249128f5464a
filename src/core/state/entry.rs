//! Records kept by the hash cache

use crate::domain::{Cnpj, DeltaError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// State of a cache entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// The hash was published in the shard named by the entry
    Committed,
    /// The entity was removed; the last hash is kept for reference
    Tombstoned,
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Committed => "committed",
            Self::Tombstoned => "tombstoned",
        }
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryState {
    type Err = DeltaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "committed" => Ok(Self::Committed),
            "tombstoned" => Ok(Self::Tombstoned),
            other => Err(DeltaError::Cache(format!("Unknown entry state '{other}'"))),
        }
    }
}

/// Last publication of one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cnpj: Cnpj,
    pub hash: String,
    pub state: EntryState,
    /// Key of the shard that last carried the document or its tombstone
    pub shard_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_live(&self) -> bool {
        self.state == EntryState::Committed
    }
}

/// One committed shard of a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardLogEntry {
    pub period: String,
    pub shard_index: u32,
    pub key: String,
    pub document_count: usize,
    pub tombstone_count: usize,
    /// SHA-256 of the published payload
    pub checksum: String,
    pub committed_at: DateTime<Utc>,
}

/// Everything a durably published shard changes in the cache
#[derive(Debug, Clone)]
pub struct ShardCommit {
    pub log: ShardLogEntry,
    /// Identifier and content hash of every document in the shard
    pub documents: Vec<(Cnpj, String)>,
    pub tombstones: Vec<Cnpj>,
}

/// Entry counts across the cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    pub partitions: usize,
    pub live: u64,
    pub tombstoned: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.live + self.tombstoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_state_round_trip() {
        for state in [EntryState::Committed, EntryState::Tombstoned] {
            assert_eq!(state.as_str().parse::<EntryState>().unwrap(), state);
        }
        assert!("deleted".parse::<EntryState>().is_err());
    }

    #[test]
    fn test_entry_state_serialization() {
        let json = serde_json::to_string(&EntryState::Tombstoned).unwrap();
        assert_eq!(json, "\"tombstoned\"");
    }

    #[test]
    fn test_stats_total() {
        let stats = CacheStats {
            partitions: 2,
            live: 10,
            tombstoned: 3,
        };
        assert_eq!(stats.total(), 13);
    }
}
