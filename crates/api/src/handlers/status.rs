//! Polling views over the queue and the agent pool.
//!
//! Both read the same scheduler state the channel pushes are derived from.

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// GET /api/v1/queue/status
pub async fn queue_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let status = state.scheduler.queue_status().await;
    Ok(Json(DataResponse { data: status }))
}

/// GET /api/v1/pool/status
pub async fn pool_status(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let status = state.scheduler.pool_status().await;
    Ok(Json(DataResponse { data: status }))
}
