//! Batch job state machine
//!
//! A file upload progresses QUEUED → UPLOADING → one terminal state
//! (SUCCEEDED, PARTIAL_UPLOAD or FAILED). Terminal jobs are never reopened,
//! which also makes FAILED dominant: once a flush failure has marked the job
//! FAILED, the later success/partial verdict is ignored.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::record::count_as_string;

/// Batch job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Accepted, pipeline not started yet
    Queued,
    /// Pipeline running
    Uploading,
    /// Every line was written
    Succeeded,
    /// Some lines were rejected; the rest were written
    PartialUpload,
    /// A store flush failed
    Failed,
}

impl BatchStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BatchStatus::Succeeded | BatchStatus::PartialUpload | BatchStatus::Failed
        )
    }

    /// Whether `self → next` is a legal move
    pub fn can_transition_to(self, next: BatchStatus) -> bool {
        match self {
            BatchStatus::Queued => next == BatchStatus::Uploading,
            BatchStatus::Uploading => next.is_terminal(),
            _ => false,
        }
    }
}

/// A rejected input line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineError {
    /// 1-based line number as counted by the reader
    #[serde(with = "count_as_string")]
    pub line: usize,
    pub message: String,
}

impl LineError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Line errors retained up to a fixed capacity, in arrival order
///
/// Errors past the capacity are dropped but still counted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineErrors {
    capacity: usize,
    kept: Vec<LineError>,
    total: usize,
}

impl LineErrors {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            kept: Vec::new(),
            total: 0,
        }
    }

    pub fn push(&mut self, error: LineError) {
        self.total += 1;
        if self.kept.len() < self.capacity {
            self.kept.push(error);
        }
    }

    /// Every error seen, including dropped ones
    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn kept(&self) -> &[LineError] {
        &self.kept
    }

    pub fn into_kept(self) -> Vec<LineError> {
        self.kept
    }
}

/// Asynchronous file ingestion task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchJob {
    pub id: Uuid,
    pub model_name: String,
    /// Data location the job reads from
    pub source: String,
    pub status: BatchStatus,
    pub errors: Vec<LineError>,
    #[serde(default)]
    pub lines_read: usize,
    #[serde(default)]
    pub lines_failed: usize,
    #[serde(default)]
    pub records_written: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl BatchJob {
    pub fn new(model_name: impl Into<String>, source: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            model_name: model_name.into(),
            source: source.into(),
            status: BatchStatus::Queued,
            errors: Vec::new(),
            lines_read: 0,
            lines_failed: 0,
            records_written: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `next` if legal. Returns false (and leaves the job untouched) otherwise.
    pub fn advance(&mut self, next: BatchStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.updated_at = Utc::now();
        true
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
