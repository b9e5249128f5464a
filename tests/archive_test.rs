//! Integration tests for the full document archive

mod common;

use cnpj_delta::core::archive::{archive_path, ArchiveExporter, ArchiveInfo, INFO_FILE};
use cnpj_delta::core::store::StructuredStore;
use common::{shard_documents, RawExtracts, TestEnv, BRANCH, HEAD_OFFICE, OTHER};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

fn exporter(env: &TestEnv, shutdown: watch::Receiver<bool>) -> ArchiveExporter {
    let store = StructuredStore::open(&env.config.paths.store_dir).unwrap();
    ArchiveExporter::new(Arc::new(store), env.config.export.page_size, shutdown)
}

fn entries(path: &Path) -> BTreeMap<String, String> {
    let file = std::fs::File::open(path).unwrap();
    let mut archive = tar::Archive::new(flate2::read::GzDecoder::new(file));
    let mut entries = BTreeMap::new();
    for entry in archive.entries().unwrap() {
        let mut entry = entry.unwrap();
        let name = entry.path().unwrap().to_string_lossy().to_string();
        let mut body = String::new();
        entry.read_to_string(&mut body).unwrap();
        entries.insert(name, body);
    }
    entries
}

#[tokio::test]
async fn test_archive_holds_one_document_per_entity() {
    let env = TestEnv::new();
    env.ingest(&RawExtracts::sample()).await.unwrap();
    let dir = env.config.paths.archive_dir.clone();

    let (_tx, rx) = watch::channel(false);
    let info = exporter(&env, rx).export(&dir).await.unwrap().unwrap();

    assert_eq!(info.total, 3);
    let entries = entries(&archive_path(&dir, &info));
    let names: Vec<&str> = entries.keys().map(String::as_str).collect();
    assert_eq!(
        names,
        vec![
            format!("{HEAD_OFFICE}.json"),
            format!("{BRANCH}.json"),
            format!("{OTHER}.json"),
        ]
    );

    let doc: serde_json::Value = serde_json::from_str(&entries[&format!("{HEAD_OFFICE}.json")]).unwrap();
    assert_eq!(doc["cnpj"], HEAD_OFFICE);
    assert_eq!(doc["razao_social"], "CAFÉ DO PORTO LTDA");

    // The hash cache is neither read nor created
    assert!(!env.config.paths.cache_dir.exists());
}

#[tokio::test]
async fn test_archive_documents_match_export() {
    let env = TestEnv::new();
    env.ingest(&RawExtracts::sample()).await.unwrap();
    env.coordinator().execute_export().await.unwrap();
    let dir = env.config.paths.archive_dir.clone();

    let (_tx, rx) = watch::channel(false);
    let info = exporter(&env, rx).export(&dir).await.unwrap().unwrap();
    let entries = entries(&archive_path(&dir, &info));

    for doc in shard_documents(&env.output_dir(), "2025-03/11/00000") {
        let id = doc["cnpj"].as_str().unwrap();
        let archived: serde_json::Value =
            serde_json::from_str(&entries[&format!("{id}.json")]).unwrap();
        assert_eq!(archived, doc);
    }
}

#[tokio::test]
async fn test_info_file_describes_archive() {
    let env = TestEnv::new();
    let ingest = env.ingest(&RawExtracts::sample()).await.unwrap();
    let dir = env.config.paths.archive_dir.clone();

    let (_tx, rx) = watch::channel(false);
    let info = exporter(&env, rx).export(&dir).await.unwrap().unwrap();

    let written: ArchiveInfo =
        serde_json::from_slice(&std::fs::read(dir.join(INFO_FILE)).unwrap()).unwrap();
    assert_eq!(written, info);
    assert_eq!(written.build_id, ingest.build_id);
    assert!(written.archive.starts_with("cnpj_documents_"));
    assert!(written.archive.ends_with(".tar.gz"));

    let bytes = std::fs::read(archive_path(&dir, &written)).unwrap();
    assert_eq!(written.archive_size, bytes.len() as u64);
    assert_eq!(written.archive_sha256, format!("{:x}", Sha256::digest(&bytes)));

    // Only the archive and its info file remain
    let mut names: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec![written.archive.clone(), INFO_FILE.to_string()]);
}

#[tokio::test]
async fn test_interrupted_archive_leaves_nothing() {
    let env = TestEnv::new();
    env.ingest(&RawExtracts::sample()).await.unwrap();
    let dir = env.config.paths.archive_dir.clone();

    let (tx, rx) = watch::channel(false);
    tx.send(true).unwrap();
    let result = exporter(&env, rx).export(&dir).await.unwrap();

    assert!(result.is_none());
    assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
}
