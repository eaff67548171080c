use axum::routing::{get, post};
use axum::Router;

use crate::handlers::agents;
use crate::state::AppState;

/// Routes mounted at `/agents`.
///
/// ```text
/// GET    /                 -> list_agents
/// GET    /{id}             -> get_agent
/// POST   /{id}/heartbeat   -> heartbeat
/// POST   /{id}/claim       -> claim_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(agents::list_agents))
        .route("/{id}", get(agents::get_agent))
        .route("/{id}/heartbeat", post(agents::heartbeat))
        .route("/{id}/claim", post(agents::claim_job))
}
