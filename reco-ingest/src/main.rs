//! reco-ingest - Recommendation ingestion service
//!
//! Loads per-signal recommendation lists into the store, either inline
//! (`POST /batch` with `data`) or from a blob (`POST /batch` with
//! `dataLocation`), and moves models between staging and production.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use reco_common::blob::{BlobStore, HttpBlobStore, LocalBlobStore};
use reco_common::config::{self, BlobBackend, StoreBackend, TomlConfig};
use reco_common::store::{MemoryStore, SqliteStore, Store};
use tracing::info;
use tracing_subscriber::EnvFilter;

use reco_ingest::services::PipelineConfig;
use reco_ingest::AppState;

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "reco-ingest", version, about = "Recommendation ingestion service")]
struct Args {
    /// Root folder holding the database and local blobs
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Explicit config file (otherwise RECO_CONFIG or the per-user default)
    #[arg(long)]
    config: Option<PathBuf>,

    /// HTTP port
    #[arg(long, env = "RECO_PORT")]
    port: Option<u16>,

    /// HTTP bind address
    #[arg(long, env = "RECO_BIND_ADDRESS")]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = TomlConfig::resolve(args.config.as_deref())?;
    config.apply_env_overrides()?;
    if let Some(port) = args.port {
        config.port = port;
    }
    if let Some(address) = args.bind_address {
        config.bind_address = address;
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting reco-ingest");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let root_folder = config::resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)
        .with_context(|| format!("Failed to create root folder {}", root_folder.display()))?;
    info!("Root folder: {}", root_folder.display());

    let store: Arc<dyn Store> = match config.store.backend {
        StoreBackend::Sqlite => {
            let db_path = root_folder.join("reco.db");
            info!("Database: {}", db_path.display());
            Arc::new(SqliteStore::connect(&db_path, config.store.max_lock_wait_ms).await?)
        }
        StoreBackend::Memory => {
            info!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let blobs: Arc<dyn BlobStore> = match config.blob.backend {
        BlobBackend::Local => {
            let blob_root = config
                .blob
                .local_root
                .clone()
                .unwrap_or_else(|| root_folder.join("blobs"));
            info!("Blob root: {}", blob_root.display());
            Arc::new(LocalBlobStore::new(blob_root))
        }
        BlobBackend::Http => {
            let base_url = config
                .blob
                .http_base_url
                .clone()
                .context("blob.http_base_url is required for the http blob backend")?;
            info!("Blob base URL: {}", base_url);
            Arc::new(HttpBlobStore::new(base_url)?)
        }
    };

    let stale = reco_ingest::db::jobs::cleanup_stale_jobs(store.as_ref()).await?;
    if stale > 0 {
        info!("Marked {} unfinished batch job(s) from a previous run as FAILED", stale);
    }

    let pipeline = PipelineConfig::from_settings(&config.pipeline);
    info!(
        workers = pipeline.workers,
        flush_threshold = pipeline.flush_threshold,
        flush_interval_secs = pipeline.flush_interval.as_secs(),
        "Pipeline configured"
    );

    let state = AppState::new(store, blobs, pipeline);
    let app = reco_ingest::build_router(state);

    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind_address, config.port))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
