//! Serialized status updates for one batch job
//!
//! Workers and the pipeline coordinator report into the same job from
//! different tasks. Every update goes through one mutex and is persisted
//! while the lock is held, so the stored document always reflects the last
//! accepted transition.

use std::sync::Arc;

use reco_common::store::Store;
use reco_common::Result;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::db;
use crate::models::{BatchJob, BatchStatus, LineError};

pub struct JobTracker {
    id: Uuid,
    store: Arc<dyn Store>,
    job: Mutex<BatchJob>,
}

impl JobTracker {
    pub fn new(store: Arc<dyn Store>, job: BatchJob) -> Self {
        Self {
            id: job.id,
            store,
            job: Mutex::new(job),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Write the current job document
    pub async fn persist(&self) -> Result<()> {
        let job = self.job.lock().await;
        db::jobs::save_job(self.store.as_ref(), &job).await
    }

    /// Move to `next` and persist. Illegal moves are ignored and return `Ok(false)`.
    pub async fn advance(&self, next: BatchStatus) -> Result<bool> {
        let mut job = self.job.lock().await;
        let from = job.status;
        if !job.advance(next) {
            tracing::debug!(batch_id = %self.id, ?from, to = ?next, "Ignoring status change");
            return Ok(false);
        }

        db::jobs::save_job(self.store.as_ref(), &job).await?;
        tracing::info!(batch_id = %self.id, ?from, to = ?next, "Batch status changed");
        Ok(true)
    }

    /// Record the final counts and errors, then attempt the terminal move.
    ///
    /// Counts and errors are stored even when the job is already terminal
    /// (a worker marked it FAILED), so the status response still shows them.
    pub async fn finish(
        &self,
        status: BatchStatus,
        errors: Vec<LineError>,
        lines_read: usize,
        lines_failed: usize,
        records_written: usize,
    ) -> Result<BatchStatus> {
        let mut job = self.job.lock().await;
        job.errors = errors;
        job.lines_read = lines_read;
        job.lines_failed = lines_failed;
        job.records_written = records_written;

        let from = job.status;
        if job.advance(status) {
            tracing::info!(batch_id = %self.id, ?from, to = ?status, "Batch status changed");
        } else {
            job.updated_at = chrono::Utc::now();
            tracing::debug!(
                batch_id = %self.id,
                ?from,
                to = ?status,
                "Keeping earlier terminal status"
            );
        }

        db::jobs::save_job(self.store.as_ref(), &job).await?;
        Ok(job.status)
    }

    pub async fn snapshot(&self) -> BatchJob {
        self.job.lock().await.clone()
    }
}
