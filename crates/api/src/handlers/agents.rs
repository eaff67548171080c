//! Handlers for the `/agents` resource: registration heartbeats, pool
//! listing and job claims.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use toolq_core::worker::HeartbeatRequest;

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// POST /api/v1/agents/{id}/heartbeat
///
/// Register a new agent or refresh an existing one.
pub async fn heartbeat(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Json(input): Json<HeartbeatRequest>,
) -> AppResult<impl IntoResponse> {
    let agent = state.scheduler.heartbeat(&agent_id, input.name).await?;
    Ok(Json(DataResponse { data: agent }))
}

/// GET /api/v1/agents
pub async fn list_agents(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let agents = state.scheduler.agents().await;
    Ok(Json(DataResponse { data: agents }))
}

/// GET /api/v1/agents/{id}
pub async fn get_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let agent = state.scheduler.agent(&agent_id).await?;
    Ok(Json(DataResponse { data: agent }))
}

/// POST /api/v1/agents/{id}/claim
///
/// Hand the next queued job to this agent. Returns 204 when there is
/// nothing to run for it.
pub async fn claim_job(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
) -> AppResult<Response> {
    match state.scheduler.claim(&agent_id).await? {
        Some(job) => Ok(Json(DataResponse { data: job }).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}
