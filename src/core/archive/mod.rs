//! Local archive of every canonical document
//!
//! Unlike the export, the archive ignores the hash cache: it writes the full
//! current state of the structured store as `cnpj_documents_<timestamp>.tar.gz`
//! with one `<cnpj>.json` entry per entity, and describes the result in an
//! `info.json` next to it.

use crate::adapters::sink::local::{sync_dir, write_durably};
use crate::core::store::StructuredStore;
use crate::core::transform::render;
use crate::domain::{Cnpj, Result};
use chrono::{DateTime, Utc};
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use uuid::Uuid;

/// Name of the statistics file written next to the archive
pub const INFO_FILE: &str = "info.json";

/// Contents of `info.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Documents in the archive
    pub total: u64,
    /// When the structured store the archive was built from was ingested
    pub last_updated: DateTime<Utc>,
    pub build_id: Uuid,
    /// File name of the archive, relative to `info.json`
    pub archive: String,
    pub archive_size: u64,
    /// SHA-256 of the archive file, hex encoded
    pub archive_sha256: String,
}

/// Writes the archive and its info file
pub struct ArchiveExporter {
    store: Arc<StructuredStore>,
    page_size: usize,
    shutdown: watch::Receiver<bool>,
}

impl ArchiveExporter {
    pub fn new(
        store: Arc<StructuredStore>,
        page_size: usize,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            page_size: page_size.max(1),
            shutdown,
        }
    }

    /// Archive every entity of the store into `dir`
    ///
    /// Returns `None` when a shutdown was requested; the partial archive is
    /// removed and no info file is written.
    pub async fn export(&self, dir: &Path) -> Result<Option<ArchiveInfo>> {
        let started = Utc::now();
        let name = format!("cnpj_documents_{}.tar.gz", started.format("%Y%m%dT%H%M%SZ"));
        let path = dir.join(&name);
        let partial = dir.join(format!(".{name}.partial"));
        tokio::fs::create_dir_all(dir).await?;

        tracing::info!(archive = %path.display(), "Writing document archive");
        let store = Arc::clone(&self.store);
        let shutdown = self.shutdown.clone();
        let page_size = self.page_size;
        let target = partial.clone();
        let written = tokio::task::spawn_blocking(move || {
            write_archive(&store, &target, page_size, &shutdown)
        })
        .await?;

        let total = match written {
            Ok(Some(total)) => total,
            Ok(None) => {
                tracing::info!("Shutdown requested, discarding partial archive");
                let _ = tokio::fs::remove_file(&partial).await;
                return Ok(None);
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        let target = partial.clone();
        let archive_sha256 = tokio::task::spawn_blocking(move || file_sha256(&target)).await??;
        tokio::fs::rename(&partial, &path).await?;
        sync_dir(dir).await?;
        let archive_size = tokio::fs::metadata(&path).await?.len();

        let manifest = self.store.manifest();
        let info = ArchiveInfo {
            total,
            last_updated: manifest.built_at,
            build_id: manifest.build_id,
            archive: name,
            archive_size,
            archive_sha256,
        };
        write_durably(&dir.join(INFO_FILE), &serde_json::to_vec_pretty(&info)?).await?;

        tracing::info!(
            archive = %path.display(),
            documents = info.total,
            size_bytes = info.archive_size,
            sha256 = %info.archive_sha256,
            "Document archive written"
        );
        Ok(Some(info))
    }
}

/// Path of the archive an info file describes
pub fn archive_path(dir: &Path, info: &ArchiveInfo) -> PathBuf {
    dir.join(&info.archive)
}

/// Streams every partition into a gzip-compressed tar at `path`
///
/// Returns the document count, or `None` when interrupted.
fn write_archive(
    store: &StructuredStore,
    path: &Path,
    page_size: usize,
    shutdown: &watch::Receiver<bool>,
) -> Result<Option<u64>> {
    let mtime = store.manifest().built_at.timestamp().max(0) as u64;
    let gz = GzEncoder::new(BufWriter::new(File::create(path)?), Compression::default());
    let mut tar = tar::Builder::new(gz);
    let mut total = 0u64;

    for key in store.partitions() {
        let reader = store.reader(&key)?;
        let mut after: Option<Cnpj> = None;
        loop {
            if *shutdown.borrow() {
                return Ok(None);
            }
            let page = reader.read_page(after.as_ref(), page_size)?;
            let last_page = page.len() < page_size;
            for record in &page {
                let doc = render(record)?;
                let mut header = tar::Header::new_gnu();
                header.set_size(doc.json.len() as u64);
                header.set_mode(0o644);
                header.set_mtime(mtime);
                tar.append_data(&mut header, format!("{}.json", doc.cnpj), doc.json.as_bytes())?;
                total += 1;
            }
            after = page.last().map(|record| record.cnpj.clone());
            if last_page {
                break;
            }
        }
        tracing::debug!(partition = %key, total, "Partition archived");
    }

    let file = tar
        .into_inner()?
        .finish()?
        .into_inner()
        .map_err(|e| e.into_error())?;
    file.sync_all()?;
    Ok(Some(total))
}

fn file_sha256(path: &Path) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut file = File::open(path)?;
    std::io::copy(&mut file, &mut hasher)?;
    hasher.flush()?;
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_sha256_matches_payload_checksum() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("data.bin");
        std::fs::write(&path, b"archive bytes").unwrap();

        assert_eq!(
            file_sha256(&path).unwrap(),
            crate::core::verification::checksum::payload_checksum(b"archive bytes")
        );
    }

    #[test]
    fn test_archive_path_is_relative_to_info() {
        let info = ArchiveInfo {
            total: 0,
            last_updated: Utc::now(),
            build_id: Uuid::nil(),
            archive: "cnpj_documents_20250301T000000Z.tar.gz".to_string(),
            archive_size: 0,
            archive_sha256: String::new(),
        };
        assert_eq!(
            archive_path(Path::new("/srv/archive"), &info),
            PathBuf::from("/srv/archive/cnpj_documents_20250301T000000Z.tar.gz")
        );
    }
}
