//! Data models for reco-ingest
//!
//! - Model identity, stage and semantic version
//! - Batch job status state machine and line errors
//! - Recommendation payload wire shapes

pub mod batch_job;
pub mod model;
pub mod record;

pub use batch_job::{BatchJob, BatchStatus, LineError, LineErrors};
pub use model::{Model, SemVer, Stage, ALLOWED_CONCATENATORS};
pub use record::{ItemScore, Record, RecordLine, SignalEntries};
