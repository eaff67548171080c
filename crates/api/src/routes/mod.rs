pub mod agents;
pub mod health;
pub mod jobs;

use axum::routing::get;
use axum::Router;

use crate::handlers::status;
use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                         channel, global feed
/// /ws/jobs/{id}               channel, single job
///
/// /jobs                       list, submit
/// /jobs/{id}                  get
/// /jobs/{id}/cancel           cancel (POST)
/// /jobs/{id}/progress         worker progress (POST)
/// /jobs/{id}/complete         worker completion (POST)
/// /jobs/{id}/fail             worker failure (POST)
/// /jobs/{id}/release          worker release (POST)
///
/// /queue/status               queue counters
/// /pool/status                agent pool snapshot
///
/// /agents                     list
/// /agents/{id}                detail
/// /agents/{id}/heartbeat      register / refresh (POST)
/// /agents/{id}/claim          claim next job (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_global_handler))
        .route("/ws/jobs/{id}", get(ws::ws_job_handler))
        .nest("/jobs", jobs::router())
        .route("/queue/status", get(status::queue_status))
        .route("/pool/status", get(status::pool_status))
        .nest("/agents", agents::router())
}
