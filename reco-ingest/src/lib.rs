//! reco-ingest library interface
//!
//! Exposes the services and the router for integration testing

pub mod api;
pub mod db;
pub mod error;
pub mod models;
pub mod services;

pub use crate::error::{ApiError, ApiResult};

use std::sync::Arc;

use axum::Router;
use chrono::{DateTime, Utc};
use reco_common::blob::BlobStore;
use reco_common::store::Store;
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;

use crate::services::{BatchOperator, ModelLifecycle, PipelineConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub lifecycle: ModelLifecycle,
    pub operator: BatchOperator,
    /// Serializes lifecycle transitions and direct uploads
    pub lifecycle_lock: Arc<Mutex<()>>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, blobs: Arc<dyn BlobStore>, pipeline: PipelineConfig) -> Self {
        Self {
            lifecycle: ModelLifecycle::new(Arc::clone(&store)),
            operator: BatchOperator::new(Arc::clone(&store), blobs, pipeline),
            store,
            lifecycle_lock: Arc::new(Mutex::new(())),
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::model_routes())
        .merge(api::batch_routes())
        .merge(api::recommendation_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
