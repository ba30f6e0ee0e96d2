//! File ingestion against the SQLite store

mod helpers;

use std::sync::Arc;

use reco_common::blob::LocalBlobStore;
use reco_common::store::{SqliteStore, Store};
use reco_ingest::models::BatchStatus;
use reco_ingest::services::{BatchOperator, ModelLifecycle};

use helpers::{record_line, test_pipeline_config, write_blob};

async fn sqlite_setup(blob_root: &std::path::Path) -> (Arc<dyn Store>, BatchOperator) {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::connect_in_memory().await.unwrap());
    ModelLifecycle::new(Arc::clone(&store))
        .create("feed", "|", vec!["userId".into(), "locale".into()])
        .await
        .unwrap();
    let operator = BatchOperator::new(
        Arc::clone(&store),
        Arc::new(LocalBlobStore::new(blob_root)),
        test_pipeline_config(),
    );
    (store, operator)
}

#[tokio::test]
async fn test_writes_plus_failures_equal_total_lines() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (store, operator) = sqlite_setup(temp_dir.path()).await;

    // 120 lines: every 7th has a bad signal, every 11th is not JSON
    let lines: Vec<String> = (1..=120)
        .map(|i| {
            if i % 11 == 0 {
                "{truncated".to_string()
            } else if i % 7 == 0 {
                record_line(&format!("u{}", i), &["a"])
            } else {
                record_line(&format!("u{}|en", i), &["a", "b"])
            }
        })
        .collect();
    let location = write_blob(temp_dir.path(), "feeds", "full.jsonl", &lines.join("\n"));

    let accepted = operator.ingest_file("feed", &location).await.unwrap();
    let report = accepted.handle.await.unwrap().unwrap();

    let stored = store.scan_all("feed_staging").await.unwrap().len();
    assert_eq!(report.lines_read, 120);
    assert_eq!(stored, report.records_written);
    assert_eq!(report.records_written + report.lines_failed, 120);
    assert_eq!(report.errors.len(), report.lines_failed.min(50));
    assert_eq!(report.status, BatchStatus::PartialUpload);

    let job = operator.job_status(accepted.batch_id).await.unwrap();
    assert_eq!(job.status, BatchStatus::PartialUpload);
    assert_eq!(job.lines_failed, report.lines_failed);
    assert_eq!(job.records_written, stored);
}

#[tokio::test]
async fn test_clean_file_succeeds_and_publishes() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (store, operator) = sqlite_setup(temp_dir.path()).await;

    let lines: Vec<String> = (0..30)
        .map(|i| record_line(&format!("u{}|de", i), &["a"]))
        .collect();
    let location = write_blob(temp_dir.path(), "feeds", "clean.jsonl", &lines.join("\n"));

    let accepted = operator.ingest_file("feed", &location).await.unwrap();
    let report = accepted.handle.await.unwrap().unwrap();
    assert_eq!(report.status, BatchStatus::Succeeded);
    assert!(report.errors.is_empty());

    let job = operator.job_status(accepted.batch_id).await.unwrap();
    assert_eq!(job.status, BatchStatus::Succeeded);

    let model = ModelLifecycle::new(Arc::clone(&store)).publish("feed").await.unwrap();
    assert_eq!(model.version.to_string(), "1.0.0");
    assert_eq!(store.scan_all("feed").await.unwrap().len(), 30);
    assert!(store.scan_all("feed_staging").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reupload_overwrites_signals() {
    let temp_dir = tempfile::tempdir().unwrap();
    let (store, operator) = sqlite_setup(temp_dir.path()).await;

    let first = write_blob(temp_dir.path(), "feeds", "v1.jsonl", &record_line("u1|en", &["old"]));
    let second = write_blob(temp_dir.path(), "feeds", "v2.jsonl", &record_line("u1|en", &["new"]));

    for location in [first, second] {
        let accepted = operator.ingest_file("feed", &location).await.unwrap();
        accepted.handle.await.unwrap().unwrap();
    }

    let value = store.get("feed_staging", "u1|en").await.unwrap().unwrap();
    assert!(value.contains("new"));
    assert_eq!(store.scan_all("feed_staging").await.unwrap().len(), 1);
}
