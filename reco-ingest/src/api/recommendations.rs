//! Serving read path
//!
//! GET /recommendations/:model/:signal

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};

use crate::{error::ApiResult, models::ItemScore, AppState};

/// GET /recommendations/:model/:signal
///
/// Items stored under `signal` in the production keyspace of a PUBLISHED model.
pub async fn get_recommendations(
    State(state): State<AppState>,
    Path((model_name, signal)): Path<(String, String)>,
) -> ApiResult<Json<Vec<ItemScore>>> {
    let items = state.lifecycle.recommendations(&model_name, &signal).await?;
    Ok(Json(items))
}

pub fn recommendation_routes() -> Router<AppState> {
    Router::new().route("/recommendations/:model_name/:signal", get(get_recommendations))
}
