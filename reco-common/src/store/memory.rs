//! In-memory store backend
//!
//! Used for development runs (`store.backend = "memory"`) and tests. Keeps
//! counters of applied writes so callers can verify how many records landed.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{KeyValue, PendingWrite, Store, WriteBatch};
use crate::Result;

type Tables = HashMap<String, BTreeMap<String, String>>;

/// Write counters for a [`MemoryStore`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStoreStats {
    /// Direct `put` calls applied
    pub puts: usize,
    /// Records applied through batch flushes
    pub batched_puts: usize,
    /// Batch flushes executed (including empty ones)
    pub flushes: usize,
}

#[derive(Default)]
struct Counters {
    puts: AtomicUsize,
    batched_puts: AtomicUsize,
    flushes: AtomicUsize,
}

/// Store backend holding all tables in process memory
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
    counters: Arc<Counters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> MemoryStoreStats {
        MemoryStoreStats {
            puts: self.counters.puts.load(Ordering::SeqCst),
            batched_puts: self.counters.batched_puts.load(Ordering::SeqCst),
            flushes: self.counters.flushes.load(Ordering::SeqCst),
        }
    }

    /// Names of all tables currently known to the store
    pub async fn table_names(&self) -> Vec<String> {
        let tables = self.tables.read().await;
        let mut names: Vec<String> = tables.keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        let tables = self.tables.read().await;
        Ok(tables.get(table).and_then(|t| t.get(key)).cloned())
    }

    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .entry(table.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.counters.puts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        self.tables.write().await.remove(table);
        Ok(())
    }

    fn batch(&self) -> Box<dyn WriteBatch> {
        Box::new(MemoryBatch {
            store: self.clone(),
            pending: Vec::new(),
        })
    }

    async fn scan_all(&self, table: &str) -> Result<Vec<KeyValue>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(table)
            .map(|t| {
                t.iter()
                    .map(|(k, v)| KeyValue::new(k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        if let Some(t) = self.tables.write().await.get_mut(table) {
            t.remove(key);
        }
        Ok(())
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        if let Some(t) = self.tables.write().await.get_mut(table) {
            t.clear();
        }
        Ok(())
    }
}

struct MemoryBatch {
    store: MemoryStore,
    pending: Vec<PendingWrite>,
}

#[async_trait]
impl WriteBatch for MemoryBatch {
    fn buffered_put(&mut self, table: &str, key: &str, value: &str) {
        self.pending.push(PendingWrite::new(table, key, value));
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        let count = pending.len();

        {
            let mut tables = self.store.tables.write().await;
            for write in pending {
                tables
                    .entry(write.table)
                    .or_default()
                    .insert(write.key, write.value);
            }
        }

        self.store.counters.flushes.fetch_add(1, Ordering::SeqCst);
        self.store
            .counters
            .batched_puts
            .fetch_add(count, Ordering::SeqCst);
        Ok(count)
    }
}
