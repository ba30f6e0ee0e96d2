//! HTTP error mapping for reco-ingest

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - e.g., upload into a published model
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Backing store or blob store failure (502)
    #[error("Store error: {0}")]
    Store(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<reco_common::Error> for ApiError {
    fn from(err: reco_common::Error) -> Self {
        use reco_common::Error;

        match err {
            Error::NotFound(msg) => ApiError::NotFound(msg),
            Error::InvalidInput(msg) => ApiError::BadRequest(msg),
            Error::Conflict(msg) => ApiError::Conflict(msg),
            ref e if e.is_backend_failure() => ApiError::Store(e.to_string()),
            e => ApiError::Internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Store(msg) => {
                tracing::error!(error = %msg, "Store failure");
                (StatusCode::BAD_GATEWAY, "STORE_ERROR", msg)
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
            }
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_common_errors_map_to_status_codes() {
        let cases = [
            (reco_common::Error::NotFound("x".into()), StatusCode::NOT_FOUND),
            (reco_common::Error::InvalidInput("x".into()), StatusCode::BAD_REQUEST),
            (reco_common::Error::Conflict("x".into()), StatusCode::CONFLICT),
            (reco_common::Error::Store("x".into()), StatusCode::BAD_GATEWAY),
            (
                reco_common::Error::Io(std::io::Error::other("disk")),
                StatusCode::BAD_GATEWAY,
            ),
            (reco_common::Error::Internal("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (reco_common::Error::Config("x".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];

        for (err, expected) in cases {
            let response = ApiError::from(err).into_response();
            assert_eq!(response.status(), expected);
        }
    }
}
