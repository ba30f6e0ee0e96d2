//! Batch ingestion API handlers
//!
//! POST /batch, GET /batch/status/:batch_id

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::{ApiError, ApiResult},
    models::SignalEntries,
    services::BatchStatusReport,
    AppState,
};

/// POST /batch request
///
/// Non-empty `data` selects direct mode and wins over `dataLocation`.
/// File mode is `dataLocation` with `data` absent or empty.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub model_name: String,
    #[serde(default)]
    pub data: Option<Vec<SignalEntries>>,
    #[serde(default)]
    pub data_location: Option<String>,
}

/// POST /batch response in file mode
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    pub batch_id: Uuid,
}

/// POST /batch
///
/// Direct mode answers 200 with line counts. File mode answers 202 with
/// the batch id; the upload continues in the background.
pub async fn submit_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchRequest>,
) -> ApiResult<Response> {
    let data = request.data.unwrap_or_default();
    if !data.is_empty() {
        let _guard = state.lifecycle_lock.lock().await;
        let result = state
            .operator
            .ingest_direct(&request.model_name, &data)
            .await?;
        return Ok(Json(result).into_response());
    }

    let Some(location) = request.data_location else {
        return Err(ApiError::BadRequest(
            "Provide non-empty data or a dataLocation".to_string(),
        ));
    };

    let accepted = {
        let _guard = state.lifecycle_lock.lock().await;
        state
            .operator
            .ingest_file(&request.model_name, &location)
            .await?
    };
    let body = BatchAccepted {
        batch_id: accepted.batch_id,
    };
    Ok((StatusCode::ACCEPTED, Json(body)).into_response())
}

/// GET /batch/status/:batch_id
pub async fn get_batch_status(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
) -> ApiResult<Json<BatchStatusReport>> {
    let id = Uuid::parse_str(&batch_id)
        .map_err(|_| ApiError::NotFound(format!("Batch job not found: {}", batch_id)))?;
    let job = state.operator.job_status(id).await?;
    Ok(Json(BatchStatusReport::from(job)))
}

pub fn batch_routes() -> Router<AppState> {
    Router::new()
        .route("/batch", post(submit_batch))
        .route("/batch/status/:batch_id", get(get_batch_status))
}
