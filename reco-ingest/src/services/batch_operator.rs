//! Ingestion entry points
//!
//! Direct mode writes inline records synchronously: a bad signal is recorded
//! and skipped, a store failure aborts the whole call. File mode validates
//! the request, persists a QUEUED job and hands the stream to the record
//! pipeline in a background task; its outcome is visible only through the
//! job status.
//!
//! Both modes write into the model's staging keyspace and refuse PUBLISHED
//! models, whose data is read-only until the model is staged again.

use std::sync::Arc;

use reco_common::blob::{BlobLocation, BlobStore};
use reco_common::store::Store;
use reco_common::{Error, Result};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::job_tracker::JobTracker;
use super::model_lifecycle::ModelLifecycle;
use super::record_pipeline::{self, PipelineConfig, PipelineReport};
use crate::db;
use crate::models::record::{count_as_string, encode_items};
use crate::models::{BatchJob, BatchStatus, LineError, LineErrors, Model, SignalEntries};

/// Rejected lines of a direct upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorRecords {
    #[serde(with = "count_as_string")]
    pub number_of_lines_failed: usize,
    pub errors: Vec<LineError>,
}

/// Direct upload response body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectIngestResult {
    #[serde(with = "count_as_string")]
    pub number_of_lines: usize,
    pub error_records: ErrorRecords,
}

/// Accepted file upload
pub struct FileIngestion {
    pub batch_id: Uuid,
    /// Resolves once the pipeline has joined every stage and stored the terminal status
    pub handle: JoinHandle<Result<PipelineReport>>,
}

/// Job status as reported to clients; errors only accompany PARTIAL_UPLOAD
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatusReport {
    pub status: BatchStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<LineError>>,
}

impl From<BatchJob> for BatchStatusReport {
    fn from(job: BatchJob) -> Self {
        let errors = (job.status == BatchStatus::PartialUpload).then_some(job.errors);
        Self {
            status: job.status,
            errors,
        }
    }
}

#[derive(Clone)]
pub struct BatchOperator {
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    lifecycle: ModelLifecycle,
    config: PipelineConfig,
}

impl BatchOperator {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, config: PipelineConfig) -> Self {
        Self {
            lifecycle: ModelLifecycle::new(Arc::clone(&store)),
            store,
            blobs,
            config,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Write inline records one by one.
    ///
    /// Every (signal, items) pair counts as one line, numbered from 1 in
    /// request order. Only the first `max_line_errors` rejections are kept.
    pub async fn ingest_direct(
        &self,
        model_name: &str,
        data: &[SignalEntries],
    ) -> Result<DirectIngestResult> {
        let model = self.writable_model(model_name).await?;
        let table = model.active_table();
        let format = model.signal_format();

        let mut errors = LineErrors::with_capacity(self.config.max_line_errors);
        let mut line_number = 0usize;

        for entries in data {
            for (signal, items) in entries.iter() {
                line_number += 1;

                if format.requires_validation() && !format.matches(signal) {
                    errors.push(LineError::new(line_number, format.mismatch_message(signal)));
                    continue;
                }

                let value = encode_items(items)?;
                self.store.put(&table, signal, &value).await.map_err(|e| {
                    tracing::error!(
                        model = %model.name,
                        signal = %signal,
                        line = line_number,
                        error = %e,
                        "Direct write failed"
                    );
                    e
                })?;
            }
        }

        tracing::info!(
            model = %model.name,
            table = %table,
            lines = line_number,
            failed = errors.total(),
            "Direct ingestion finished"
        );

        Ok(DirectIngestResult {
            number_of_lines: line_number,
            error_records: ErrorRecords {
                number_of_lines_failed: errors.total(),
                errors: errors.into_kept(),
            },
        })
    }

    /// Accept a file upload and start its pipeline in the background.
    ///
    /// The location, model and object are checked before the job exists, so
    /// a request that fails here leaves no job behind.
    pub async fn ingest_file(
        &self,
        model_name: &str,
        data_location: &str,
    ) -> Result<FileIngestion> {
        let location: BlobLocation = data_location.parse()?;
        let model = self.writable_model(model_name).await?;

        if !self.blobs.exists(&location).await? {
            return Err(Error::NotFound(format!("Data location not found: {}", location)));
        }

        let job = BatchJob::new(&model.name, location.to_string());
        let batch_id = job.id;
        let tracker = Arc::new(JobTracker::new(Arc::clone(&self.store), job));
        tracker.persist().await?;

        tracing::info!(
            batch_id = %batch_id,
            model = %model.name,
            source = %location,
            "Batch job queued"
        );

        let store = Arc::clone(&self.store);
        let blobs = Arc::clone(&self.blobs);
        let config = self.config.clone();
        let handle = tokio::spawn(async move {
            let result = run_job(store, blobs, location, model, Arc::clone(&tracker), config).await;
            if let Err(e) = &result {
                tracing::error!(batch_id = %tracker.id(), error = %e, "Batch job aborted");
            }
            result
        });

        Ok(FileIngestion { batch_id, handle })
    }

    pub async fn job_status(&self, batch_id: Uuid) -> Result<BatchJob> {
        db::jobs::load_job(self.store.as_ref(), batch_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Batch job not found: {}", batch_id)))
    }

    async fn writable_model(&self, model_name: &str) -> Result<Model> {
        let model = self.lifecycle.get(model_name).await?;
        if model.is_published() {
            return Err(Error::Conflict(format!(
                "Model {} is published; stage it before uploading",
                model.name
            )));
        }
        Ok(model)
    }
}

async fn run_job(
    store: Arc<dyn Store>,
    blobs: Arc<dyn BlobStore>,
    location: BlobLocation,
    model: Model,
    tracker: Arc<JobTracker>,
    config: PipelineConfig,
) -> Result<PipelineReport> {
    let reader = match blobs.open(&location).await {
        Ok(reader) => reader,
        Err(e) => {
            tracing::error!(
                batch_id = %tracker.id(),
                source = %location,
                error = %e,
                "Opening source failed"
            );
            tracker.advance(BatchStatus::Uploading).await?;
            tracker.finish(BatchStatus::Failed, Vec::new(), 0, 0, 0).await?;
            return Err(e);
        }
    };

    record_pipeline::run(store, reader, model, tracker, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use reco_common::blob::LocalBlobStore;
    use reco_common::store::{KeyValue, MemoryStore, WriteBatch};
    use std::time::Duration;

    use crate::models::ItemScore;

    fn item(id: &str) -> ItemScore {
        [("id", id), ("score", "0.9")].into_iter().collect()
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            workers: 2,
            flush_threshold: 100,
            flush_interval: Duration::from_secs(10),
            record_queue_capacity: 16,
            max_line_errors: 50,
        }
    }

    async fn setup(
        store: Arc<dyn Store>,
        blob_root: &std::path::Path,
    ) -> (BatchOperator, ModelLifecycle) {
        let lifecycle = ModelLifecycle::new(Arc::clone(&store));
        lifecycle
            .create("articles", "_", vec!["articleId".into(), "userId".into()])
            .await
            .unwrap();
        let blobs = Arc::new(LocalBlobStore::new(blob_root));
        let operator = BatchOperator::new(store, blobs, config());
        (operator, lifecycle)
    }

    /// Store whose writes to one signal fail
    struct PoisonedKeyStore {
        inner: MemoryStore,
        poisoned: &'static str,
    }

    #[async_trait]
    impl Store for PoisonedKeyStore {
        async fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
            self.inner.get(table, key).await
        }
        async fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
            if key == self.poisoned {
                return Err(Error::Store("write rejected".to_string()));
            }
            self.inner.put(table, key, value).await
        }
        async fn drop_table(&self, table: &str) -> Result<()> {
            self.inner.drop_table(table).await
        }
        fn batch(&self) -> Box<dyn WriteBatch> {
            self.inner.batch()
        }
        async fn scan_all(&self, table: &str) -> Result<Vec<KeyValue>> {
            self.inner.scan_all(table).await
        }
        async fn delete(&self, table: &str, key: &str) -> Result<()> {
            self.inner.delete(table, key).await
        }
        async fn truncate(&self, table: &str) -> Result<()> {
            self.inner.truncate(table).await
        }
    }

    #[tokio::test]
    async fn test_direct_mode_reports_bad_signal_position() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let (operator, _) = setup(Arc::new(store.clone()), temp_dir.path()).await;
        let puts_before = store.stats().puts;

        let data = vec![[
            ("a1_u1".to_string(), vec![item("x")]),
            ("justone".to_string(), vec![item("y")]),
        ]
        .into_iter()
        .collect::<SignalEntries>()];

        let result = operator.ingest_direct("articles", &data).await.unwrap();

        assert_eq!(result.number_of_lines, 2);
        assert_eq!(result.error_records.number_of_lines_failed, 1);
        assert_eq!(result.error_records.errors[0].line, 2);
        assert_eq!(store.stats().puts - puts_before, 1);

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["numberOfLines"], "2");
        assert_eq!(json["errorRecords"]["numberOfLinesFailed"], "1");
        assert_eq!(json["errorRecords"]["errors"][0]["line"], "2");
    }

    #[tokio::test]
    async fn test_direct_mode_counts_across_maps() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let (operator, _) = setup(Arc::new(store.clone()), temp_dir.path()).await;
        let puts_before = store.stats().puts;

        let data: Vec<SignalEntries> = vec![
            [("a1_u1", vec![item("x")]), ("bad", vec![])].into_iter().collect(),
            [("a2_u2", vec![]), ("a3_u3", vec![item("z")]), ("bad_too_many", vec![])]
                .into_iter()
                .collect(),
        ];

        let result = operator.ingest_direct("articles", &data).await.unwrap();

        assert_eq!(result.number_of_lines, 5);
        assert_eq!(result.error_records.number_of_lines_failed, 2);
        let lines: Vec<usize> = result.error_records.errors.iter().map(|e| e.line).collect();
        assert_eq!(lines, vec![2, 5]);
        assert_eq!(store.stats().puts - puts_before, 3);
        assert_eq!(store.get("articles_staging", "a2_u2").await.unwrap().as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn test_direct_mode_store_failure_aborts() {
        let temp_dir = tempfile::tempdir().unwrap();
        let inner = MemoryStore::new();
        let store = Arc::new(PoisonedKeyStore {
            inner: inner.clone(),
            poisoned: "a2_u2",
        });
        let (operator, _) = setup(store, temp_dir.path()).await;

        let data: Vec<SignalEntries> = vec![[
            ("a1_u1", vec![item("x")]),
            ("a2_u2", vec![item("y")]),
            ("a3_u3", vec![item("z")]),
        ]
        .into_iter()
        .collect()];

        let result = operator.ingest_direct("articles", &data).await;

        assert!(matches!(result, Err(Error::Store(_))));
        assert!(inner.get("articles_staging", "a1_u1").await.unwrap().is_some());
        assert!(inner.get("articles_staging", "a3_u3").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_published_model_rejects_uploads() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (operator, lifecycle) = setup(Arc::new(MemoryStore::new()), temp_dir.path()).await;
        lifecycle.publish("articles").await.unwrap();

        assert!(matches!(
            operator.ingest_direct("articles", &[]).await,
            Err(Error::Conflict(_))
        ));
        assert!(matches!(
            operator.ingest_file("articles", "store://recs/a.jsonl").await,
            Err(Error::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_file_mode_runs_to_terminal_status() {
        let temp_dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(temp_dir.path().join("recs")).unwrap();
        std::fs::write(
            temp_dir.path().join("recs/a.jsonl"),
            concat!(
                r#"{"signalId": "a1_u1", "recommended": [{"id": "x"}]}"#,
                "\n",
                r#"{"signalId": "nope", "recommended": []}"#,
                "\n",
            ),
        )
        .unwrap();

        let store = MemoryStore::new();
        let (operator, _) = setup(Arc::new(store.clone()), temp_dir.path()).await;

        let accepted = operator
            .ingest_file("articles", "store://recs/a.jsonl")
            .await
            .unwrap();
        let report = accepted.handle.await.unwrap().unwrap();

        assert_eq!(report.status, BatchStatus::PartialUpload);
        let job = operator.job_status(accepted.batch_id).await.unwrap();
        assert_eq!(job.status, BatchStatus::PartialUpload);
        assert_eq!(job.errors.len(), 1);

        let status = BatchStatusReport::from(job);
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["status"], "PARTIAL_UPLOAD");
        assert_eq!(json["errors"][0]["line"], "2");
        assert!(store.get("articles_staging", "a1_u1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_mode_rejects_before_creating_job() {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = MemoryStore::new();
        let (operator, _) = setup(Arc::new(store.clone()), temp_dir.path()).await;

        assert!(matches!(
            operator.ingest_file("articles", "store://recs/missing.jsonl").await,
            Err(Error::NotFound(_))
        ));
        assert!(matches!(
            operator.ingest_file("articles", "recs/a.jsonl").await,
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            operator.ingest_file("ghost", "store://recs/a.jsonl").await,
            Err(Error::NotFound(_))
        ));
        assert!(store
            .scan_all(db::BATCH_JOBS_TABLE)
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_status_report_hides_errors_unless_partial() {
        let mut job = BatchJob::new("m", "store://b/k");
        job.errors.push(LineError::new(1, "bad"));
        job.advance(BatchStatus::Uploading);
        job.advance(BatchStatus::Failed);

        let json = serde_json::to_value(BatchStatusReport::from(job)).unwrap();
        assert_eq!(json, serde_json::json!({"status": "FAILED"}));
    }

    #[tokio::test]
    async fn test_unknown_job_is_not_found() {
        let temp_dir = tempfile::tempdir().unwrap();
        let (operator, _) = setup(Arc::new(MemoryStore::new()), temp_dir.path()).await;
        assert!(matches!(
            operator.job_status(Uuid::new_v4()).await,
            Err(Error::NotFound(_))
        ));
    }
}
