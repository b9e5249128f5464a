//! Local directory shard destination
//!
//! Writes `<root>/<key>.ndjson` and `<root>/<key>.manifest.json`. Both files
//! go through a temporary file that is fsynced and renamed into place, so a
//! reader never observes a partially written shard. The manifest is written
//! last and marks the shard complete. The parent directory is fsynced after
//! each rename so the new directory entry survives a power loss.

use super::traits::{ShardPayload, ShardSink};
use crate::domain::{Cnpj, DeltaError, PartitionKey, Period, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

pub struct LocalDirectorySink {
    root: PathBuf,
}

impl LocalDirectorySink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ndjson_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.ndjson"))
    }

    pub fn manifest_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.manifest.json"))
    }

    /// Indexes of the complete shards stored for one period and partition
    pub async fn published_indexes(
        &self,
        period: &Period,
        partition: &PartitionKey,
    ) -> Result<Vec<u32>> {
        let dir = self
            .root
            .join(period.as_str())
            .join(partition.as_str());
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(upload_err(&dir, e)),
        };

        let mut indexes = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| upload_err(&dir, e))? {
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".manifest.json")) else {
                continue;
            };
            if let Ok(index) = stem.parse::<u32>() {
                indexes.push(index);
            }
        }
        indexes.sort_unstable();
        Ok(indexes)
    }
}

fn upload_err(path: &Path, err: std::io::Error) -> DeltaError {
    DeltaError::Upload(format!("{}: {err}", path.display()))
}

/// Flushes a directory's entries to disk
#[cfg(unix)]
pub(crate) async fn sync_dir(dir: &Path) -> Result<()> {
    let handle = tokio::fs::File::open(dir)
        .await
        .map_err(|e| upload_err(dir, e))?;
    handle.sync_all().await.map_err(|e| upload_err(dir, e))
}

// Directory handles cannot be fsynced here; renames are durable on their own.
#[cfg(not(unix))]
pub(crate) async fn sync_dir(_dir: &Path) -> Result<()> {
    Ok(())
}

/// Creates `dir` and its missing ancestors, fsyncing every directory that gained an entry
async fn create_dir_durably(dir: &Path) -> Result<()> {
    let mut missing = Vec::new();
    let mut cursor = Some(dir);
    while let Some(current) = cursor {
        if tokio::fs::try_exists(current).await.unwrap_or(false) {
            break;
        }
        missing.push(current.to_path_buf());
        cursor = current.parent().filter(|p| !p.as_os_str().is_empty());
    }
    if missing.is_empty() {
        return Ok(());
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| upload_err(dir, e))?;
    for created in &missing {
        if let Some(parent) = created.parent().filter(|p| !p.as_os_str().is_empty()) {
            sync_dir(parent).await?;
        }
    }
    Ok(())
}

/// Replaces `path` with `bytes` through a fsynced temporary sibling
pub(crate) async fn write_durably(path: &Path, bytes: &[u8]) -> Result<()> {
    let parent = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(parent) = parent {
        create_dir_durably(parent).await?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    let mut file = tokio::fs::File::create(&tmp)
        .await
        .map_err(|e| upload_err(&tmp, e))?;
    file.write_all(bytes).await.map_err(|e| upload_err(&tmp, e))?;
    file.sync_all().await.map_err(|e| upload_err(&tmp, e))?;
    drop(file);

    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| upload_err(path, e))?;

    match parent {
        Some(parent) => sync_dir(parent).await,
        None => sync_dir(Path::new(".")).await,
    }
}

#[async_trait]
impl ShardSink for LocalDirectorySink {
    async fn publish(&self, shard: &ShardPayload) -> Result<()> {
        let manifest = serde_json::to_vec_pretty(&shard.manifest())?;
        write_durably(&self.ndjson_path(&shard.key), &shard.ndjson()).await?;
        write_durably(&self.manifest_path(&shard.key), &manifest).await?;

        tracing::debug!(
            key = %shard.key,
            documents = shard.documents.len(),
            tombstones = shard.tombstones.len(),
            root = %self.root.display(),
            "Shard written"
        );
        Ok(())
    }

    async fn next_shard_index(
        &self,
        period: &Period,
        partition: &PartitionKey,
    ) -> Result<Option<u32>> {
        let indexes = self.published_indexes(period, partition).await?;
        Ok(Some(indexes.last().map_or(0, |last| last + 1)))
    }

    async fn fetch_document(&self, key: &str, cnpj: &Cnpj) -> Result<Option<String>> {
        let path = self.ndjson_path(key);
        let body = match tokio::fs::read_to_string(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(upload_err(&path, e)),
        };

        // The identifier is always the first field of a canonical document.
        let prefix = format!("{{\"cnpj\":\"{cnpj}\"");
        Ok(body
            .lines()
            .find(|line| line.starts_with(&prefix))
            .map(str::to_string))
    }
}
