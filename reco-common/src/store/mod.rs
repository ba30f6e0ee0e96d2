//! Key-value store contract
//!
//! The ingest service treats the store as the system of record for
//! recommendation lists, model metadata and batch job status. Everything is
//! addressed by `(table, key)` and values are opaque strings (JSON in practice).
//!
//! Buffered writes go through a [`WriteBatch`] obtained from [`Store::batch`].
//! A batch is owned by exactly one writer; concurrent writers each take their
//! own batch instead of sharing one.

pub mod memory;
pub mod sqlite;

pub use memory::{MemoryStore, MemoryStoreStats};
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::Result;

/// One stored record as returned by [`Store::scan_all`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Abstract key-value store
#[async_trait]
pub trait Store: Send + Sync {
    /// Read one value. `Ok(None)` when the key (or table) does not exist.
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>>;

    /// Write one value immediately
    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()>;

    /// Remove a table and all of its records
    async fn drop_table(&self, table: &str) -> Result<()>;

    /// Start an independent write batch for pipelined writes
    fn batch(&self) -> Box<dyn WriteBatch>;

    /// Every record of a table, ordered by key
    async fn scan_all(&self, table: &str) -> Result<Vec<KeyValue>>;

    /// Remove one record. Removing a missing key is not an error.
    async fn delete(&self, table: &str, key: &str) -> Result<()>;

    /// Remove every record of a table
    async fn truncate(&self, table: &str) -> Result<()>;
}

/// Deferred writes flushed to the store as one round trip
#[async_trait]
pub trait WriteBatch: Send {
    /// Enqueue a write. Nothing is durable until [`WriteBatch::flush`] succeeds.
    fn buffered_put(&mut self, table: &str, key: &str, value: &str);

    /// Number of writes waiting for the next flush
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Execute all buffered writes as one unit.
    ///
    /// The buffer is cleared whether or not the flush succeeds, so a failed
    /// flush is never replayed by a later one.
    async fn flush(&mut self) -> Result<usize>;
}

/// A buffered write waiting in a [`WriteBatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PendingWrite {
    pub table: String,
    pub key: String,
    pub value: String,
}

impl PendingWrite {
    pub(crate) fn new(table: &str, key: &str, value: &str) -> Self {
        Self {
            table: table.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}
