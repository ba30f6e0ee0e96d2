//! Shared test helpers: spy store and app builders

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reco_common::blob::LocalBlobStore;
use reco_common::store::{KeyValue, MemoryStore, Store, WriteBatch};
use reco_common::{Error, Result};
use reco_ingest::services::PipelineConfig;
use reco_ingest::AppState;

#[derive(Default)]
struct SpyState {
    writes: AtomicUsize,
    flushes: AtomicUsize,
    fail_flushes: AtomicBool,
}

/// Memory store that counts acknowledged writes and can fail every flush
#[derive(Clone, Default)]
pub struct SpyStore {
    inner: MemoryStore,
    state: Arc<SpyState>,
}

impl SpyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acknowledged writes into recommendation keyspaces (`put` + flushed batch entries)
    pub fn writes(&self) -> usize {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.state.flushes.load(Ordering::SeqCst)
    }

    pub fn fail_flushes(&self, fail: bool) {
        self.state.fail_flushes.store(fail, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }
}

fn is_metadata(table: &str) -> bool {
    table == "models" || table == "batch_jobs"
}

#[async_trait]
impl Store for SpyStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        self.inner.get(table, key).await
    }

    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
        self.inner.put(table, key, value).await?;
        if !is_metadata(table) {
            self.state.writes.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.inner.drop_table(table).await
    }

    fn batch(&self) -> Box<dyn WriteBatch> {
        Box::new(SpyBatch {
            inner: self.inner.batch(),
            state: Arc::clone(&self.state),
        })
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

struct SpyBatch {
    inner: Box<dyn WriteBatch>,
    state: Arc<SpyState>,
}

#[async_trait]
impl WriteBatch for SpyBatch {
    fn buffered_put(&mut self, table: &str, key: &str, value: &str) {
        self.inner.buffered_put(table, key, value);
    }

    fn len(&self) -> usize {
        self.inner.len()
    }

    async fn flush(&mut self) -> Result<usize> {
        self.state.flushes.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_flushes.load(Ordering::SeqCst) {
            let dropped = self.inner.len();
            // Discard the buffer the way a real failed round trip does
            let _ = self.inner.flush().await;
            return Err(Error::Store(format!("injected flush failure ({} writes)", dropped)));
        }
        let written = self.inner.flush().await?;
        self.state.writes.fetch_add(written, Ordering::SeqCst);
        Ok(written)
    }
}

pub fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        workers: 4,
        flush_threshold: 5,
        flush_interval: Duration::from_secs(10),
        record_queue_capacity: 16,
        max_line_errors: 50,
    }
}

/// App state over `store`, reading blobs from `blob_root`
pub fn test_state(store: Arc<dyn Store>, blob_root: &Path) -> AppState {
    AppState::new(
        store,
        Arc::new(LocalBlobStore::new(blob_root)),
        test_pipeline_config(),
    )
}

/// Write `<root>/<bucket>/<key>` and return its `store://` location
pub fn write_blob(root: &Path, bucket: &str, key: &str, content: &str) -> String {
    let path = root.join(bucket).join(key);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("Failed to create blob dir");
    }
    std::fs::write(&path, content).expect("Failed to write blob");
    format!("store://{}/{}", bucket, key)
}

/// One JSON line of a file upload
pub fn record_line(signal: &str, item_ids: &[&str]) -> String {
    let items: Vec<serde_json::Value> = item_ids
        .iter()
        .map(|id| serde_json::json!({"id": id, "score": "0.5"}))
        .collect();
    serde_json::json!({"signalId": signal, "recommended": items}).to_string()
}
