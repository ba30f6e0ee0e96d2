//! SQLite store backend
//!
//! All tables share one physical `kv_records` table keyed by `(tbl, key)`.
//! Batch flushes run inside a single transaction; lock contention between
//! concurrent flushes is absorbed by [`retry_on_lock`].

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::Row;

use super::{KeyValue, PendingWrite, Store, WriteBatch};
use crate::retry::retry_on_lock;
use crate::{Error, Result};

/// Default SQLite busy_timeout per connection
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 250;

/// Store backend persisting every table in one SQLite database
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists
    pub async fn connect(db_path: &Path, max_lock_wait_ms: u64) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path = db_path
            .to_str()
            .ok_or_else(|| Error::Config(format!("Invalid database path: {:?}", db_path)))?;
        tracing::debug!("Connecting to store database: {}", path);

        let options = SqliteConnectOptions::from_str(path)?
            .busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .acquire_timeout(Duration::from_millis(max_lock_wait_ms.max(1000)))
            .connect_with(options)
            .await?;

        Self::from_pool(pool, max_lock_wait_ms).await
    }

    /// Private in-memory database (single connection so every query sees the same data)
    pub async fn connect_in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::from_pool(pool, 1000).await
    }

    async fn from_pool(pool: SqlitePool, max_lock_wait_ms: u64) -> Result<Self> {
        init_tables(&pool).await?;
        Ok(Self {
            pool,
            max_lock_wait_ms,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

async fn init_tables(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS kv_records (
            tbl TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            PRIMARY KEY (tbl, key)
        )
        "#,
    )
    .execute(pool)
    .await?;

    tracing::info!("Store tables initialized (kv_records)");
    Ok(())
}

const UPSERT: &str = r#"
    INSERT INTO kv_records (tbl, key, value) VALUES (?, ?, ?)
    ON CONFLICT(tbl, key) DO UPDATE SET value = excluded.value
"#;

#[async_trait]
impl Store for SqliteStore {
    async fn get(&self, table: &str, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM kv_records WHERE tbl = ? AND key = ?")
                .bind(table)
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;
        Ok(value)
    }

    async fn put(&self, table: &str, key: &str, value: &str) -> Result<()> {
        retry_on_lock("put", self.max_lock_wait_ms, || async move {
            sqlx::query(UPSERT)
                .bind(table)
                .bind(key)
                .bind(value)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn drop_table(&self, table: &str) -> Result<()> {
        // Tables exist only through their rows, so dropping and truncating coincide
        self.truncate(table).await
    }

    fn batch(&self) -> Box<dyn WriteBatch> {
        Box::new(SqliteBatch {
            pool: self.pool.clone(),
            max_lock_wait_ms: self.max_lock_wait_ms,
            pending: Vec::new(),
        })
    }

    async fn scan_all(&self, table: &str) -> Result<Vec<KeyValue>> {
        let rows = sqlx::query("SELECT key, value FROM kv_records WHERE tbl = ? ORDER BY key")
            .bind(table)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .iter()
            .map(|row| KeyValue::new(row.get::<String, _>("key"), row.get::<String, _>("value")))
            .collect())
    }

    async fn delete(&self, table: &str, key: &str) -> Result<()> {
        retry_on_lock("delete", self.max_lock_wait_ms, || async move {
            sqlx::query("DELETE FROM kv_records WHERE tbl = ? AND key = ?")
                .bind(table)
                .bind(key)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    async fn truncate(&self, table: &str) -> Result<()> {
        retry_on_lock("truncate", self.max_lock_wait_ms, || async move {
            let result = sqlx::query("DELETE FROM kv_records WHERE tbl = ?")
                .bind(table)
                .execute(&self.pool)
                .await?;
            tracing::debug!(table, removed = result.rows_affected(), "Table truncated");
            Ok(())
        })
        .await
    }
}

struct SqliteBatch {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
    pending: Vec<PendingWrite>,
}

#[async_trait]
impl WriteBatch for SqliteBatch {
    fn buffered_put(&mut self, table: &str, key: &str, value: &str) {
        self.pending.push(PendingWrite::new(table, key, value));
    }

    fn len(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self) -> Result<usize> {
        let pending = std::mem::take(&mut self.pending);
        if pending.is_empty() {
            return Ok(0);
        }

        let pool = &self.pool;
        let writes = &pending;
        retry_on_lock("flush batch", self.max_lock_wait_ms, || async move {
            let mut tx = pool.begin().await?;
            for write in writes {
                sqlx::query(UPSERT)
                    .bind(&write.table)
                    .bind(&write.key)
                    .bind(&write.value)
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            Ok(())
        })
        .await?;

        Ok(pending.len())
    }
}
