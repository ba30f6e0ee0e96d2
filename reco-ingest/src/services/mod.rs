//! Ingestion services
//!
//! - `model_lifecycle`: stage/version transitions and keyspace migration
//! - `record_pipeline`: producer → workers → collector for file uploads
//! - `batch_operator`: direct and file ingestion entry points
//! - `job_tracker`: serialized status writes for one batch job
//! - `signal_validator`: signal arity check

pub mod batch_operator;
pub mod job_tracker;
pub mod model_lifecycle;
pub mod record_pipeline;
pub mod signal_validator;

pub use batch_operator::{BatchOperator, BatchStatusReport, DirectIngestResult, FileIngestion};
pub use job_tracker::JobTracker;
pub use model_lifecycle::ModelLifecycle;
pub use record_pipeline::{FlushReason, PipelineConfig, PipelineReport};
pub use signal_validator::SignalFormat;
