//! Durable identifier to content-hash mapping
//!
//! One SQLite database per partition under the cache directory, plus a
//! `layout.json` that pins the partition prefix length the cache was written
//! with:
//!
//! ```text
//! <cache_dir>/layout.json
//! <cache_dir>/<partition>.db   entries + shard_log (WAL, synchronous=FULL)
//! ```
//!
//! Each partition connection sits behind its own mutex. Handles are shared
//! through a registry, so every caller working on a partition serializes on
//! the same lock while different partitions proceed in parallel.

use super::entry::{CacheEntry, CacheStats, EntryState, ShardCommit, ShardLogEntry};
use crate::domain::{Cnpj, DeltaError, PartitionKey, Period, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub const LAYOUT_FILE: &str = "layout.json";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS entries (
        cnpj TEXT PRIMARY KEY,
        hash TEXT NOT NULL,
        state TEXT NOT NULL,
        shard_key TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );
    CREATE TABLE IF NOT EXISTS shard_log (
        period TEXT NOT NULL,
        shard_index INTEGER NOT NULL,
        shard_key TEXT NOT NULL,
        document_count INTEGER NOT NULL,
        tombstone_count INTEGER NOT NULL,
        checksum TEXT NOT NULL,
        committed_at TEXT NOT NULL,
        PRIMARY KEY (period, shard_index)
    );
";

// Reviving a tombstoned entry counts as a fresh creation.
const UPSERT_COMMITTED: &str = "
    INSERT INTO entries (cnpj, hash, state, shard_key, created_at, updated_at)
    VALUES (?1, ?2, 'committed', ?3, ?4, ?4)
    ON CONFLICT(cnpj) DO UPDATE SET
        hash = excluded.hash,
        shard_key = excluded.shard_key,
        updated_at = excluded.updated_at,
        created_at = CASE WHEN entries.state = 'tombstoned'
                          THEN excluded.created_at
                          ELSE entries.created_at END,
        state = 'committed'
";

const MARK_TOMBSTONED: &str = "
    UPDATE entries
    SET state = 'tombstoned', shard_key = COALESCE(?2, shard_key), updated_at = ?3
    WHERE cnpj = ?1 AND state = 'committed'
";

fn cache_err(err: rusqlite::Error) -> DeltaError {
    DeltaError::Cache(err.to_string())
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DeltaError::Cache(format!("Invalid timestamp '{value}': {e}")))
}

fn parse_cnpj(value: String) -> Result<Cnpj> {
    Cnpj::new(value).map_err(DeltaError::Cache)
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheLayout {
    prefix_len: usize,
}

/// Cache of one partition; all methods block
pub struct PartitionCache {
    key: PartitionKey,
    conn: Mutex<Connection>,
}

impl PartitionCache {
    pub fn open(path: &Path, key: PartitionKey) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| {
            DeltaError::Cache(format!("Cannot open cache partition {key}: {e}"))
        })?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=FULL;
             PRAGMA busy_timeout=5000;",
        )
        .map_err(cache_err)?;
        conn.execute_batch(SCHEMA).map_err(cache_err)?;
        Ok(Self {
            key,
            conn: Mutex::new(conn),
        })
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DeltaError::Cache(format!("Cache lock of partition {} poisoned", self.key)))
    }

    /// Committed hash of `cnpj`; tombstoned and unknown ids are absent
    pub fn lookup(&self, cnpj: &Cnpj) -> Result<Option<String>> {
        self.conn()?
            .query_row(
                "SELECT hash FROM entries WHERE cnpj = ?1 AND state = 'committed'",
                [cnpj.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(cache_err)
    }

    /// Every committed hash of the partition
    pub fn lookup_all(&self) -> Result<HashMap<Cnpj, String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT cnpj, hash FROM entries WHERE state = 'committed'")
            .map_err(cache_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(cache_err)?;

        let mut hashes = HashMap::new();
        for row in rows {
            let (cnpj, hash) = row.map_err(cache_err)?;
            hashes.insert(parse_cnpj(cnpj)?, hash);
        }
        Ok(hashes)
    }

    pub fn entry(&self, cnpj: &Cnpj) -> Result<Option<CacheEntry>> {
        let row = self
            .conn()?
            .query_row(
                "SELECT hash, state, shard_key, created_at, updated_at FROM entries WHERE cnpj = ?1",
                [cnpj.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()
            .map_err(cache_err)?;

        row.map(|(hash, state, shard_key, created_at, updated_at)| -> Result<CacheEntry> {
            Ok(CacheEntry {
                cnpj: cnpj.clone(),
                hash,
                state: state.parse()?,
                shard_key,
                created_at: parse_time(&created_at)?,
                updated_at: parse_time(&updated_at)?,
            })
        })
        .transpose()
    }

    pub fn commit(&self, cnpj: &Cnpj, hash: &str, shard_key: &str) -> Result<()> {
        self.conn()?
            .execute(UPSERT_COMMITTED, params![cnpj.as_str(), hash, shard_key, now()])
            .map_err(cache_err)?;
        Ok(())
    }

    /// Marks a committed entry removed; returns false when nothing was live
    pub fn tombstone(&self, cnpj: &Cnpj) -> Result<bool> {
        let changed = self
            .conn()?
            .execute(
                MARK_TOMBSTONED,
                params![cnpj.as_str(), Option::<&str>::None, now()],
            )
            .map_err(cache_err)?;
        Ok(changed > 0)
    }

    /// Applies a published shard in one transaction
    pub fn commit_shard(&self, commit: &ShardCommit) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(cache_err)?;
        let at = now();
        {
            let mut upsert = tx.prepare_cached(UPSERT_COMMITTED).map_err(cache_err)?;
            for (cnpj, hash) in &commit.documents {
                upsert
                    .execute(params![cnpj.as_str(), hash, commit.log.key, at])
                    .map_err(cache_err)?;
            }
            let mut tombstone = tx.prepare_cached(MARK_TOMBSTONED).map_err(cache_err)?;
            for cnpj in &commit.tombstones {
                tombstone
                    .execute(params![cnpj.as_str(), commit.log.key, at])
                    .map_err(cache_err)?;
            }
        }
        tx.execute(
            "INSERT OR REPLACE INTO shard_log
                 (period, shard_index, shard_key, document_count, tombstone_count, checksum, committed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                commit.log.period,
                commit.log.shard_index,
                commit.log.key,
                commit.log.document_count as i64,
                commit.log.tombstone_count as i64,
                commit.log.checksum,
                commit.log.committed_at.to_rfc3339_opts(SecondsFormat::Micros, true),
            ],
        )
        .map_err(cache_err)?;
        tx.commit().map_err(cache_err)
    }

    /// Index the next shard of `period` must use
    pub fn next_shard_index(&self, period: &Period) -> Result<u32> {
        let next: i64 = self
            .conn()?
            .query_row(
                "SELECT COALESCE(MAX(shard_index) + 1, 0) FROM shard_log WHERE period = ?1",
                [period.as_str()],
                |row| row.get(0),
            )
            .map_err(cache_err)?;
        u32::try_from(next).map_err(|e| DeltaError::Cache(e.to_string()))
    }

    /// Committed shards in index order, optionally limited to one period
    pub fn shard_log(&self, period: Option<&Period>) -> Result<Vec<ShardLogEntry>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT period, shard_index, shard_key, document_count, tombstone_count, checksum, committed_at
                 FROM shard_log
                 WHERE ?1 IS NULL OR period = ?1
                 ORDER BY period, shard_index",
            )
            .map_err(cache_err)?;
        let rows = stmt
            .query_map([period.map(Period::as_str)], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, u32>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                    row.get::<_, String>(5)?,
                    row.get::<_, String>(6)?,
                ))
            })
            .map_err(cache_err)?;

        let mut log = Vec::new();
        for row in rows {
            let (period, shard_index, key, documents, tombstones, checksum, committed_at) =
                row.map_err(cache_err)?;
            log.push(ShardLogEntry {
                period,
                shard_index,
                key,
                document_count: documents as usize,
                tombstone_count: tombstones as usize,
                checksum,
                committed_at: parse_time(&committed_at)?,
            });
        }
        Ok(log)
    }

    /// (live, tombstoned) entry counts
    pub fn counts(&self) -> Result<(u64, u64)> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT state, COUNT(*) FROM entries GROUP BY state")
            .map_err(cache_err)?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
            .map_err(cache_err)?;

        let (mut live, mut tombstoned) = (0, 0);
        for row in rows {
            let (state, count) = row.map_err(cache_err)?;
            match state.parse::<EntryState>()? {
                EntryState::Committed => live = count as u64,
                EntryState::Tombstoned => tombstoned = count as u64,
            }
        }
        Ok((live, tombstoned))
    }
}

/// The hash cache across all partitions
pub struct HashCache {
    root: PathBuf,
    prefix_len: usize,
    registry: Mutex<HashMap<PartitionKey, Arc<PartitionCache>>>,
}

impl HashCache {
    /// Opens or creates the cache at `dir`
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the cache was written with a
    /// different partition prefix length.
    pub fn open(dir: impl AsRef<Path>, prefix_len: usize) -> Result<Self> {
        let root = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;

        let layout_path = root.join(LAYOUT_FILE);
        if layout_path.is_file() {
            let layout: CacheLayout =
                serde_json::from_str(&std::fs::read_to_string(&layout_path)?)?;
            if layout.prefix_len != prefix_len {
                return Err(DeltaError::Configuration(format!(
                    "Hash cache at {} uses partition prefix length {}, but {} is configured",
                    root.display(),
                    layout.prefix_len,
                    prefix_len
                )));
            }
        } else {
            std::fs::write(
                &layout_path,
                serde_json::to_vec_pretty(&CacheLayout { prefix_len })?,
            )?;
        }

        Ok(Self {
            root,
            prefix_len,
            registry: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn prefix_len(&self) -> usize {
        self.prefix_len
    }

    fn partition_path(&self, key: &PartitionKey) -> PathBuf {
        self.root.join(format!("{key}.db"))
    }

    fn registry(&self) -> Result<MutexGuard<'_, HashMap<PartitionKey, Arc<PartitionCache>>>> {
        self.registry
            .lock()
            .map_err(|_| DeltaError::Cache("Cache registry lock poisoned".to_string()))
    }

    /// Shared handle on one partition, created on first use
    pub fn partition(&self, key: &PartitionKey) -> Result<Arc<PartitionCache>> {
        let mut registry = self.registry()?;
        if let Some(cache) = registry.get(key) {
            return Ok(Arc::clone(cache));
        }
        let cache = Arc::new(PartitionCache::open(
            &self.partition_path(key),
            key.clone(),
        )?);
        registry.insert(key.clone(), Arc::clone(&cache));
        Ok(cache)
    }

    /// Like [`Self::partition`], without creating a database for an unseen partition
    fn existing(&self, key: &PartitionKey) -> Result<Option<Arc<PartitionCache>>> {
        let registered = self.registry()?.contains_key(key);
        if !registered && !self.partition_path(key).is_file() {
            return Ok(None);
        }
        self.partition(key).map(Some)
    }

    /// Partitions with a database on disk, sorted
    pub fn partitions(&self) -> Result<Vec<PartitionKey>> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&self.root)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            if let Some(key) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| PartitionKey::new(s).ok())
            {
                keys.push(key);
            }
        }
        keys.sort();
        Ok(keys)
    }

    pub async fn lookup(&self, cnpj: &Cnpj) -> Result<Option<String>> {
        let Some(cache) = self.existing(&cnpj.partition(self.prefix_len))? else {
            return Ok(None);
        };
        let cnpj = cnpj.clone();
        blocking(cache, move |c| c.lookup(&cnpj)).await
    }

    /// Bulk variant of [`Self::lookup`] for a whole partition
    pub async fn lookup_partition(&self, key: &PartitionKey) -> Result<HashMap<Cnpj, String>> {
        match self.existing(key)? {
            Some(cache) => blocking(cache, |c| c.lookup_all()).await,
            None => Ok(HashMap::new()),
        }
    }

    pub async fn entry(&self, cnpj: &Cnpj) -> Result<Option<CacheEntry>> {
        let Some(cache) = self.existing(&cnpj.partition(self.prefix_len))? else {
            return Ok(None);
        };
        let cnpj = cnpj.clone();
        blocking(cache, move |c| c.entry(&cnpj)).await
    }

    /// Records a published hash; call only after the shard is durably written
    pub async fn commit(&self, cnpj: &Cnpj, hash: &str, shard_key: &str) -> Result<()> {
        let cache = self.partition(&cnpj.partition(self.prefix_len))?;
        let (cnpj, hash, shard_key) = (cnpj.clone(), hash.to_string(), shard_key.to_string());
        blocking(cache, move |c| c.commit(&cnpj, &hash, &shard_key)).await
    }

    pub async fn tombstone(&self, cnpj: &Cnpj) -> Result<bool> {
        let Some(cache) = self.existing(&cnpj.partition(self.prefix_len))? else {
            return Ok(false);
        };
        let cnpj = cnpj.clone();
        blocking(cache, move |c| c.tombstone(&cnpj)).await
    }

    pub async fn commit_shard(&self, key: &PartitionKey, commit: ShardCommit) -> Result<()> {
        let cache = self.partition(key)?;
        blocking(cache, move |c| c.commit_shard(&commit)).await
    }

    pub async fn next_shard_index(&self, key: &PartitionKey, period: &Period) -> Result<u32> {
        match self.existing(key)? {
            Some(cache) => {
                let period = period.clone();
                blocking(cache, move |c| c.next_shard_index(&period)).await
            }
            None => Ok(0),
        }
    }

    pub async fn shard_log(
        &self,
        key: &PartitionKey,
        period: Option<&Period>,
    ) -> Result<Vec<ShardLogEntry>> {
        match self.existing(key)? {
            Some(cache) => {
                let period = period.cloned();
                blocking(cache, move |c| c.shard_log(period.as_ref())).await
            }
            None => Ok(Vec::new()),
        }
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for key in self.partitions()? {
            let cache = self.partition(&key)?;
            let (live, tombstoned) = blocking(cache, |c| c.counts()).await?;
            stats.partitions += 1;
            stats.live += live;
            stats.tombstoned += tombstoned;
        }
        Ok(stats)
    }
}

async fn blocking<T, F>(cache: Arc<PartitionCache>, op: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(&PartitionCache) -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || op(&cache)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn cnpj(s: &str) -> Cnpj {
        Cnpj::new(s).unwrap()
    }

    fn commit_for(period: &str, index: u32, docs: &[(&str, &str)], tombstones: &[&str]) -> ShardCommit {
        ShardCommit {
            log: ShardLogEntry {
                period: period.to_string(),
                shard_index: index,
                key: format!("{period}/11/{index:05}"),
                document_count: docs.len(),
                tombstone_count: tombstones.len(),
                checksum: "00".repeat(32),
                committed_at: Utc::now(),
            },
            documents: docs.iter().map(|(id, h)| (cnpj(id), h.to_string())).collect(),
            tombstones: tombstones.iter().map(|id| cnpj(id)).collect(),
        }
    }

    #[tokio::test]
    async fn test_commit_lookup_tombstone() {
        let temp = TempDir::new().unwrap();
        let cache = HashCache::open(temp.path(), 2).unwrap();
        let id = cnpj("11222333000181");

        assert_eq!(cache.lookup(&id).await.unwrap(), None);
        cache.commit(&id, "00000000000000aa", "2025-01/11/00000").await.unwrap();
        assert_eq!(
            cache.lookup(&id).await.unwrap().as_deref(),
            Some("00000000000000aa")
        );

        assert!(cache.tombstone(&id).await.unwrap());
        assert_eq!(cache.lookup(&id).await.unwrap(), None);
        assert!(!cache.tombstone(&id).await.unwrap());

        let entry = cache.entry(&id).await.unwrap().unwrap();
        assert_eq!(entry.state, EntryState::Tombstoned);
        assert_eq!(entry.hash, "00000000000000aa");
    }

    #[tokio::test]
    async fn test_update_keeps_creation_and_revival_resets_it() {
        let temp = TempDir::new().unwrap();
        let cache = HashCache::open(temp.path(), 2).unwrap();
        let id = cnpj("11222333000181");

        cache.commit(&id, "a", "k0").await.unwrap();
        let first = cache.entry(&id).await.unwrap().unwrap();
        cache.commit(&id, "b", "k1").await.unwrap();
        let updated = cache.entry(&id).await.unwrap().unwrap();
        assert_eq!(updated.created_at, first.created_at);
        assert_eq!(updated.shard_key.as_deref(), Some("k1"));

        cache.tombstone(&id).await.unwrap();
        cache.commit(&id, "c", "k2").await.unwrap();
        let revived = cache.entry(&id).await.unwrap().unwrap();
        assert!(revived.is_live());
        assert_eq!(revived.created_at, revived.updated_at);
    }

    #[tokio::test]
    async fn test_commit_shard_applies_everything() {
        let temp = TempDir::new().unwrap();
        let cache = HashCache::open(temp.path(), 2).unwrap();
        let key = PartitionKey::new("11").unwrap();
        let period = Period::new("2025-01").unwrap();

        cache.commit(&cnpj("11999888000100"), "old", "x").await.unwrap();
        assert_eq!(cache.next_shard_index(&key, &period).await.unwrap(), 0);

        cache
            .commit_shard(
                &key,
                commit_for(
                    "2025-01",
                    0,
                    &[("11222333000181", "h1"), ("11222333000262", "h2")],
                    &["11999888000100"],
                ),
            )
            .await
            .unwrap();

        let known = cache.lookup_partition(&key).await.unwrap();
        assert_eq!(known.len(), 2);
        assert_eq!(known[&cnpj("11222333000262")], "h2");
        assert_eq!(cache.next_shard_index(&key, &period).await.unwrap(), 1);
        assert_eq!(
            cache
                .next_shard_index(&key, &Period::new("2025-02").unwrap())
                .await
                .unwrap(),
            0
        );

        let log = cache.shard_log(&key, Some(&period)).await.unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].key, "2025-01/11/00000");
        assert_eq!(log[0].tombstone_count, 1);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.live, 2);
        assert_eq!(stats.tombstoned, 1);
        assert_eq!(stats.partitions, 1);
    }

    #[tokio::test]
    async fn test_reads_do_not_create_partitions() {
        let temp = TempDir::new().unwrap();
        let cache = HashCache::open(temp.path(), 2).unwrap();
        let key = PartitionKey::new("42").unwrap();

        assert!(cache.lookup_partition(&key).await.unwrap().is_empty());
        assert!(cache.partitions().unwrap().is_empty());

        cache.commit(&cnpj("42000111000105"), "h", "k").await.unwrap();
        assert_eq!(cache.partitions().unwrap(), vec![key]);
    }

    #[test]
    fn test_registry_shares_handles() {
        let temp = TempDir::new().unwrap();
        let cache = HashCache::open(temp.path(), 2).unwrap();
        let key = PartitionKey::new("11").unwrap();
        let a = cache.partition(&key).unwrap();
        let b = cache.partition(&key).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_prefix_mismatch_is_configuration_error() {
        let temp = TempDir::new().unwrap();
        HashCache::open(temp.path(), 2).unwrap();
        let err = HashCache::open(temp.path(), 3).err().unwrap();
        assert!(matches!(err, DeltaError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_reopen_is_durable() {
        let temp = TempDir::new().unwrap();
        let id = cnpj("11222333000181");
        {
            let cache = HashCache::open(temp.path(), 2).unwrap();
            cache.commit(&id, "abc", "k").await.unwrap();
        }
        let cache = HashCache::open(temp.path(), 2).unwrap();
        assert_eq!(cache.lookup(&id).await.unwrap().as_deref(), Some("abc"));
    }
}
