//! HTTP API handlers for reco-ingest

pub mod batch;
pub mod health;
pub mod models;
pub mod recommendations;

pub use batch::batch_routes;
pub use health::health_routes;
pub use models::model_routes;
pub use recommendations::recommendation_routes;
