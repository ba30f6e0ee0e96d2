//! Model lifecycle API handlers
//!
//! POST /models, GET|DELETE /models/:name, POST /models/:name/publish,
//! POST /models/:name/stage, PUT /models/:name/signal-type,
//! DELETE /models/:name/signals/:signal
//!
//! Every mutation runs under the shared lifecycle lock.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::{error::ApiResult, models::Model, AppState};

/// POST /models request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModelRequest {
    pub model_name: String,
    pub signal_order: Vec<String>,
    /// Empty for single-field signals
    #[serde(default)]
    pub concatenator: String,
}

/// PUT /models/:name/signal-type request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSignalTypeRequest {
    pub signal_order: Vec<String>,
    /// Keeps the current concatenator when absent
    #[serde(default)]
    pub concatenator: Option<String>,
}

/// POST /models
pub async fn create_model(
    State(state): State<AppState>,
    Json(request): Json<CreateModelRequest>,
) -> ApiResult<(StatusCode, Json<Model>)> {
    let _guard = state.lifecycle_lock.lock().await;
    let model = state
        .lifecycle
        .create(&request.model_name, &request.concatenator, request.signal_order)
        .await?;
    Ok((StatusCode::CREATED, Json(model)))
}

/// GET /models/:name
pub async fn get_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Model>> {
    Ok(Json(state.lifecycle.get(&name).await?))
}

/// POST /models/:name/publish
pub async fn publish_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Model>> {
    let _guard = state.lifecycle_lock.lock().await;
    Ok(Json(state.lifecycle.publish(&name).await?))
}

/// POST /models/:name/stage
pub async fn stage_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Model>> {
    let _guard = state.lifecycle_lock.lock().await;
    Ok(Json(state.lifecycle.stage(&name).await?))
}

/// DELETE /models/:name
///
/// Clears the staged data and resets the version; the model itself remains.
pub async fn delete_model(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<Model>> {
    let _guard = state.lifecycle_lock.lock().await;
    Ok(Json(state.lifecycle.delete(&name).await?))
}

/// PUT /models/:name/signal-type
pub async fn update_signal_type(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(request): Json<UpdateSignalTypeRequest>,
) -> ApiResult<Json<Model>> {
    let _guard = state.lifecycle_lock.lock().await;
    let model = state
        .lifecycle
        .update_signal_type(&name, request.signal_order, request.concatenator)
        .await?;
    Ok(Json(model))
}

/// DELETE /models/:name/signals/:signal
pub async fn remove_signal(
    State(state): State<AppState>,
    Path((name, signal)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let _guard = state.lifecycle_lock.lock().await;
    state.lifecycle.remove_signal(&name, &signal).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub fn model_routes() -> Router<AppState> {
    Router::new()
        .route("/models", post(create_model))
        .route("/models/:name", get(get_model).delete(delete_model))
        .route("/models/:name/publish", post(publish_model))
        .route("/models/:name/stage", post(stage_model))
        .route("/models/:name/signal-type", put(update_signal_type))
        .route("/models/:name/signals/:signal", delete(remove_signal))
}
