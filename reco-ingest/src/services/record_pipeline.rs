//! File ingestion pipeline
//!
//! ```text
//! blob ──lines──▶ producer ──Record──▶ [bounded queue] ──▶ worker × N ──flush──▶ store
//!                    │
//!                    └──LineError──▶ [error queue] ──▶ collector (first N kept)
//! ```
//!
//! The producer closes both queues when the stream ends; that is the only
//! shutdown signal downstream. [`run`] joins the producer, every worker and
//! the collector before it writes the terminal job status, so a caller that
//! awaits it observes the final state.
//!
//! Line numbering: the counter advances only for lines that decode. A line
//! that fails to decode is reported with the counter value before it, i.e.
//! the number of records decoded so far.

use std::sync::Arc;
use std::time::Duration;

use reco_common::blob::BlobReader;
use reco_common::config::PipelineSettings;
use reco_common::store::{Store, WriteBatch};
use reco_common::{Error, Result};
use tokio::io::AsyncBufReadExt;
use tokio::sync::{mpsc, Mutex};
use tokio::time::{Instant, MissedTickBehavior};

use super::job_tracker::JobTracker;
use crate::models::record::encode_items;
use crate::models::{BatchStatus, LineError, LineErrors, Model, Record, RecordLine};

/// Longest slice of a raw line quoted in a decode error
const RAW_LINE_PREVIEW: usize = 200;

/// Pipeline tuning, resolved from [`PipelineSettings`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub workers: usize,
    pub flush_threshold: usize,
    pub flush_interval: Duration,
    pub record_queue_capacity: usize,
    pub max_line_errors: usize,
}

impl PipelineConfig {
    /// `workers = 0` resolves to one worker per CPU
    pub fn from_settings(settings: &PipelineSettings) -> Self {
        let workers = if settings.workers == 0 {
            num_cpus::get()
        } else {
            settings.workers
        };

        Self {
            workers: workers.max(1),
            flush_threshold: settings.flush_threshold,
            flush_interval: Duration::from_secs(settings.flush_interval_secs),
            record_queue_capacity: settings.record_queue_capacity.max(1),
            max_line_errors: settings.max_line_errors,
        }
    }

    fn flush_policy(&self) -> FlushPolicy {
        FlushPolicy {
            threshold: self.flush_threshold,
            interval: self.flush_interval,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_settings(&PipelineSettings::default())
    }
}

/// Why a worker flushed its batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlushReason {
    /// Pending writes exceeded the threshold
    Size,
    /// The flush interval elapsed with writes pending
    Interval,
    /// Record queue closed
    Drain,
}

/// When a worker's pending writes must go to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FlushPolicy {
    pub threshold: usize,
    pub interval: Duration,
}

impl FlushPolicy {
    /// Checked after every buffered write
    pub(crate) fn after_write(&self, pending: usize, since_flush: Duration) -> Option<FlushReason> {
        if pending > self.threshold {
            Some(FlushReason::Size)
        } else {
            self.on_tick(pending, since_flush)
        }
    }

    /// Checked on every timer tick
    pub(crate) fn on_tick(&self, pending: usize, since_flush: Duration) -> Option<FlushReason> {
        (pending > 0 && since_flush >= self.interval).then_some(FlushReason::Interval)
    }
}

/// Per-worker counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub records: usize,
    pub written: usize,
    pub size_flushes: usize,
    pub interval_flushes: usize,
    pub drain_flushes: usize,
    pub failed_flushes: usize,
}

impl WorkerStats {
    fn count_flush(&mut self, reason: FlushReason) {
        match reason {
            FlushReason::Size => self.size_flushes += 1,
            FlushReason::Interval => self.interval_flushes += 1,
            FlushReason::Drain => self.drain_flushes += 1,
        }
    }
}

/// Outcome of one pipeline run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    /// Every line in the source, including blank and undecodable ones
    pub lines_read: usize,
    pub records_written: usize,
    /// Uncapped count of rejected lines
    pub lines_failed: usize,
    /// First rejected lines, in arrival order
    pub errors: Vec<LineError>,
    pub status: BatchStatus,
    pub workers: Vec<WorkerStats>,
}

#[derive(Debug, Default)]
struct ProducerSummary {
    lines_read: usize,
    read_error: Option<String>,
}

/// Run one file ingestion to completion and record the terminal job status.
///
/// The job moves to UPLOADING first. A flush failure in any worker moves it
/// to FAILED immediately and that verdict stands; otherwise it ends
/// PARTIAL_UPLOAD when any line was rejected and SUCCEEDED when none was.
/// A stage task that fails to join also ends the job FAILED, after every
/// other stage has been joined, and is returned as an error.
pub async fn run(
    store: Arc<dyn Store>,
    reader: BlobReader,
    model: Model,
    tracker: Arc<JobTracker>,
    config: &PipelineConfig,
) -> Result<PipelineReport> {
    if let Err(e) = tracker.advance(BatchStatus::Uploading).await {
        tracing::error!(batch_id = %tracker.id(), error = %e, "Starting upload failed");
        if let Err(finish_error) = tracker.finish(BatchStatus::Failed, Vec::new(), 0, 0, 0).await {
            tracing::warn!(
                batch_id = %tracker.id(),
                error = %finish_error,
                "Persisting FAILED status failed"
            );
        }
        return Err(e);
    }

    let (record_tx, record_rx) = mpsc::channel::<Record>(config.record_queue_capacity);
    let (error_tx, error_rx) = mpsc::unbounded_channel::<LineError>();
    let record_rx = Arc::new(Mutex::new(record_rx));

    tracing::info!(
        batch_id = %tracker.id(),
        model = %model.name,
        table = %model.active_table(),
        workers = config.workers,
        "Starting file ingestion"
    );

    let producer = tokio::spawn(produce(reader, model, record_tx, error_tx));
    let collector = tokio::spawn(collect(error_rx, config.max_line_errors));

    let policy = config.flush_policy();
    let workers: Vec<_> = (0..config.workers)
        .map(|worker_id| {
            tokio::spawn(run_worker(
                worker_id,
                Arc::clone(&store),
                Arc::clone(&record_rx),
                policy,
                Arc::clone(&tracker),
            ))
        })
        .collect();
    // Workers own the receiver now; if they all exit the producer sees a closed queue
    drop(record_rx);

    // Every stage is joined even when another one failed
    let mut stage_failures = Vec::new();

    let summary = producer.await.unwrap_or_else(|e| {
        stage_failures.push(format!("producer task failed: {}", e));
        ProducerSummary::default()
    });

    let mut worker_stats = Vec::with_capacity(workers.len());
    for (worker_id, handle) in workers.into_iter().enumerate() {
        match handle.await {
            Ok(stats) => worker_stats.push(stats),
            Err(e) => stage_failures.push(format!("worker {} task failed: {}", worker_id, e)),
        }
    }

    let errors = collector.await.unwrap_or_else(|e| {
        stage_failures.push(format!("error collector task failed: {}", e));
        LineErrors::with_capacity(config.max_line_errors)
    });

    let records_written: usize = worker_stats.iter().map(|s| s.written).sum();
    let failed_flushes: usize = worker_stats.iter().map(|s| s.failed_flushes).sum();
    let lines_failed = errors.total();

    let verdict = if failed_flushes > 0
        || summary.read_error.is_some()
        || !stage_failures.is_empty()
    {
        BatchStatus::Failed
    } else if !errors.is_empty() {
        BatchStatus::PartialUpload
    } else {
        BatchStatus::Succeeded
    };

    if let Some(read_error) = &summary.read_error {
        tracing::error!(batch_id = %tracker.id(), error = %read_error, "Reading source failed");
    }
    for failure in &stage_failures {
        tracing::error!(batch_id = %tracker.id(), error = %failure, "Pipeline stage failed");
    }

    let errors = errors.into_kept();
    let status = tracker
        .finish(
            verdict,
            errors.clone(),
            summary.lines_read,
            lines_failed,
            records_written,
        )
        .await?;

    tracing::info!(
        batch_id = %tracker.id(),
        ?status,
        lines_read = summary.lines_read,
        records_written,
        lines_failed,
        failed_flushes,
        "File ingestion finished"
    );

    if !stage_failures.is_empty() {
        return Err(Error::Internal(stage_failures.join("; ")));
    }

    Ok(PipelineReport {
        lines_read: summary.lines_read,
        records_written,
        lines_failed,
        errors,
        status,
        workers: worker_stats,
    })
}

/// Decode and validate lines, fanning out records and errors.
///
/// Both senders are dropped on return, closing the queues.
async fn produce(
    mut reader: BlobReader,
    model: Model,
    records: mpsc::Sender<Record>,
    errors: mpsc::UnboundedSender<LineError>,
) -> ProducerSummary {
    let table = model.active_table();
    let format = model.signal_format();
    let mut summary = ProducerSummary::default();
    let mut line_number = 0usize;
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                summary.read_error = Some(e.to_string());
                break;
            }
        }
        summary.lines_read += 1;

        // Collector outlives the producer; a closed queue means it panicked
        let line = match decode_line(trim_line_ending(&buf)) {
            Ok(line) => line,
            Err(message) => {
                let _ = errors.send(LineError::new(line_number, message));
                continue;
            }
        };
        line_number += 1;

        if format.requires_validation() && !format.matches(&line.signal_id) {
            let _ = errors.send(LineError::new(
                line_number,
                format.mismatch_message(&line.signal_id),
            ));
            continue;
        }

        let record = Record {
            table: table.clone(),
            signal_id: line.signal_id,
            recommended: line.recommended,
        };
        if records.send(record).await.is_err() {
            summary.read_error = Some("all workers stopped before the stream ended".to_string());
            break;
        }
    }

    tracing::debug!(lines_read = summary.lines_read, "Producer finished");
    summary
}

fn trim_line_ending(raw: &[u8]) -> &[u8] {
    let raw = raw.strip_suffix(b"\n").unwrap_or(raw);
    raw.strip_suffix(b"\r").unwrap_or(raw)
}

/// Decode one line; the error is the message stored for the line
fn decode_line(raw: &[u8]) -> std::result::Result<RecordLine, String> {
    let text = std::str::from_utf8(raw).map_err(|e| {
        format!("invalid UTF-8 ({}): {}", e, preview(&String::from_utf8_lossy(raw)))
    })?;
    serde_json::from_str(text).map_err(|e| format!("invalid record ({}): {}", e, preview(text)))
}

fn preview(raw: &str) -> String {
    if raw.chars().count() <= RAW_LINE_PREVIEW {
        return raw.to_string();
    }
    let mut cut: String = raw.chars().take(RAW_LINE_PREVIEW).collect();
    cut.push_str("...");
    cut
}

async fn collect(mut errors: mpsc::UnboundedReceiver<LineError>, capacity: usize) -> LineErrors {
    let mut kept = LineErrors::with_capacity(capacity);
    while let Some(error) = errors.recv().await {
        kept.push(error);
    }
    kept
}

async fn next_record(records: &Mutex<mpsc::Receiver<Record>>) -> Option<Record> {
    records.lock().await.recv().await
}

/// Consume records until the queue closes, flushing by size, interval and on drain
pub(crate) async fn run_worker(
    worker_id: usize,
    store: Arc<dyn Store>,
    records: Arc<Mutex<mpsc::Receiver<Record>>>,
    policy: FlushPolicy,
    tracker: Arc<JobTracker>,
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut batch = store.batch();
    let mut last_flush = Instant::now();

    let mut ticker = tokio::time::interval_at(Instant::now() + policy.interval, policy.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            received = next_record(&records) => {
                let Some(record) = received else {
                    let reason = FlushReason::Drain;
                    flush(worker_id, batch.as_mut(), reason, &mut stats, &tracker).await;
                    break;
                };
                stats.records += 1;

                match encode_items(&record.recommended) {
                    Ok(value) => batch.buffered_put(&record.table, &record.signal_id, &value),
                    Err(e) => {
                        tracing::error!(
                            worker_id,
                            signal = %record.signal_id,
                            error = %e,
                            "Encoding items failed"
                        );
                        mark_failed(&tracker).await;
                        continue;
                    }
                }

                if let Some(reason) = policy.after_write(batch.len(), last_flush.elapsed()) {
                    flush(worker_id, batch.as_mut(), reason, &mut stats, &tracker).await;
                    last_flush = Instant::now();
                }
            }

            _ = ticker.tick() => {
                if let Some(reason) = policy.on_tick(batch.len(), last_flush.elapsed()) {
                    flush(worker_id, batch.as_mut(), reason, &mut stats, &tracker).await;
                    last_flush = Instant::now();
                }
            }
        }
    }

    tracing::debug!(worker_id, ?stats, "Worker finished");
    stats
}

async fn flush(
    worker_id: usize,
    batch: &mut dyn WriteBatch,
    reason: FlushReason,
    stats: &mut WorkerStats,
    tracker: &JobTracker,
) {
    let pending = batch.len();
    match batch.flush().await {
        Ok(written) => {
            stats.written += written;
            stats.count_flush(reason);
            tracing::debug!(worker_id, ?reason, written, "Flushed batch");
        }
        Err(e) => {
            stats.failed_flushes += 1;
            tracing::error!(worker_id, ?reason, pending, error = %e, "Flush failed");
            mark_failed(tracker).await;
        }
    }
}

async fn mark_failed(tracker: &JobTracker) {
    if let Err(e) = tracker.advance(BatchStatus::Failed).await {
        // Status is still FAILED in memory and is persisted again on finish
        tracing::warn!(batch_id = %tracker.id(), error = %e, "Persisting FAILED status failed");
    }
}
