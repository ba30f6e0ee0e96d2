//! # Reco Common Library
//!
//! Shared code for the recommendation ingest service:
//! - Error and result types
//! - Configuration loading
//! - Key-value store contract and backends
//! - Blob store contract and backends
//! - Lock-retry helper for store writes

pub mod blob;
pub mod config;
pub mod error;
pub mod retry;
pub mod store;

pub use error::{Error, Result};
