//! Persistence of models and batch jobs through the store contract
//!
//! Both live in ordinary store tables as JSON documents, next to the
//! recommendation keyspaces they describe.

pub mod jobs;
pub mod models;

/// Table holding one JSON [`crate::models::Model`] per model name
pub const MODELS_TABLE: &str = "models";

/// Table holding one JSON [`crate::models::BatchJob`] per job id
pub const BATCH_JOBS_TABLE: &str = "batch_jobs";
