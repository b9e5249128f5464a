//! Integration tests for dry-run mode
//!
//! A dry run classifies and counts like a real export but publishes no shard
//! and leaves the hash cache exactly as it was.

mod common;

use cnpj_delta::config::DeltaConfig;
use common::{cnpj, RawExtracts, TestEnv, OTHER};

#[test]
fn test_dry_run_flags() {
    let mut config = DeltaConfig::default();
    assert!(!config.is_dry_run());

    config.export.dry_run = true;
    assert!(config.is_dry_run());

    config.export.dry_run = false;
    config.application.dry_run = true;
    assert!(config.is_dry_run());
}

#[tokio::test]
async fn test_dry_run_publishes_and_commits_nothing() {
    let mut env = TestEnv::new();
    env.config.export.dry_run = true;
    env.config.verification.enable_verification = true;
    env.ingest(&RawExtracts::sample()).await.unwrap();

    let coordinator = env.coordinator();
    let summary = coordinator.execute_export().await.unwrap();

    assert!(summary.dry_run);
    assert!(summary.is_successful());
    assert_eq!(summary.new, 3);
    // Planned shards
    assert_eq!(summary.shards_published, 2);
    assert!(summary.verification_report.is_none());

    assert!(env.published_files().is_empty());
    assert!(coordinator.cache().partitions().unwrap().is_empty());
    assert_eq!(coordinator.cache().lookup(&cnpj(OTHER)).await.unwrap(), None);
}

#[tokio::test]
async fn test_dry_run_after_real_run_reports_pending_changes() {
    let mut env = TestEnv::new();
    let mut extracts = RawExtracts::sample();
    env.ingest(&extracts).await.unwrap();
    env.coordinator().execute_export().await.unwrap();
    let published = env.published_files();

    extracts.establishment_mut(OTHER).status = "08";
    env.ingest(&extracts.without_establishment(common::BRANCH))
        .await
        .unwrap();

    env.config.export.dry_run = true;
    let coordinator = env.coordinator();
    let before = coordinator.cache().lookup_partition(&cnpj(OTHER).partition(2)).await.unwrap();
    let summary = coordinator.execute_export().await.unwrap();

    assert_eq!(summary.modified, 1);
    assert_eq!(summary.removed, 1);
    assert_eq!(env.published_files(), published);
    let after = coordinator.cache().lookup_partition(&cnpj(OTHER).partition(2)).await.unwrap();
    assert_eq!(before, after);

    // The real run still sees both changes
    env.config.export.dry_run = false;
    let real = env.coordinator().execute_export().await.unwrap();
    assert_eq!(real.modified, 1);
    assert_eq!(real.removed, 1);
}
