//! Common error types for the recommendation services

use thiserror::Error;

/// Common result type for store, blob and config operations
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types across the recommendation services
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode failure
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input or request parameter
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation conflicts with current resource state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backend (store or blob store) failure
    #[error("Store error: {0}")]
    Store(String),

    /// Internal server error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// True for failures raised by a storage backend rather than by the caller's input
    pub fn is_backend_failure(&self) -> bool {
        matches!(self, Error::Database(_) | Error::Io(_) | Error::Store(_))
    }
}
