//! Batch job persistence

use reco_common::store::Store;
use reco_common::{Error, Result};
use uuid::Uuid;

use super::BATCH_JOBS_TABLE;
use crate::models::{BatchJob, BatchStatus};

pub async fn save_job(store: &dyn Store, job: &BatchJob) -> Result<()> {
    let value = serde_json::to_string(job)?;
    store.put(BATCH_JOBS_TABLE, &job.id.to_string(), &value).await
}

pub async fn load_job(store: &dyn Store, id: Uuid) -> Result<Option<BatchJob>> {
    match store.get(BATCH_JOBS_TABLE, &id.to_string()).await? {
        Some(value) => {
            let job = serde_json::from_str(&value).map_err(|e| {
                Error::Internal(format!("Failed to deserialize batch job {}: {}", id, e))
            })?;
            Ok(Some(job))
        }
        None => Ok(None),
    }
}

/// Mark jobs left QUEUED/UPLOADING by a previous process as FAILED.
///
/// Ingestion runs in a background task that dies with the process, so such a
/// job can never reach a terminal state on its own.
pub async fn cleanup_stale_jobs(store: &dyn Store) -> Result<usize> {
    let mut cleaned = 0;

    for record in store.scan_all(BATCH_JOBS_TABLE).await? {
        let mut job: BatchJob = match serde_json::from_str(&record.value) {
            Ok(job) => job,
            Err(e) => {
                tracing::warn!(key = %record.key, error = %e, "Skipping unreadable batch job");
                continue;
            }
        };

        if job.is_terminal() {
            continue;
        }

        tracing::info!(
            batch_id = %job.id,
            status = ?job.status,
            "Marking stale batch job as failed"
        );
        job.status = BatchStatus::Failed;
        job.updated_at = chrono::Utc::now();
        save_job(store, &job).await?;
        cleaned += 1;
    }

    Ok(cleaned)
}

#[cfg(test)]
mod tests {
    use super::*;
    use reco_common::store::MemoryStore;

    #[tokio::test]
    async fn test_save_and_load() {
        let store = MemoryStore::new();
        let job = BatchJob::new("m", "store://b/k");

        save_job(&store, &job).await.unwrap();
        assert_eq!(load_job(&store, job.id).await.unwrap(), Some(job));
        assert_eq!(load_job(&store, Uuid::new_v4()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cleanup_only_touches_unfinished_jobs() {
        let store = MemoryStore::new();

        let queued = BatchJob::new("m", "store://b/1");
        let mut uploading = BatchJob::new("m", "store://b/2");
        uploading.advance(BatchStatus::Uploading);
        let mut done = BatchJob::new("m", "store://b/3");
        done.advance(BatchStatus::Uploading);
        done.advance(BatchStatus::Succeeded);

        for job in [&queued, &uploading, &done] {
            save_job(&store, job).await.unwrap();
        }

        assert_eq!(cleanup_stale_jobs(&store).await.unwrap(), 2);

        let status = |id| {
            let store = store.clone();
            async move { load_job(&store, id).await.unwrap().unwrap().status }
        };
        assert_eq!(status(queued.id).await, BatchStatus::Failed);
        assert_eq!(status(uploading.id).await, BatchStatus::Failed);
        assert_eq!(status(done.id).await, BatchStatus::Succeeded);
    }
}
