use axum::routing::{get, post};
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                -> list_jobs
/// POST   /                -> submit_job
/// GET    /{id}            -> get_job
/// POST   /{id}/cancel     -> cancel_job
/// POST   /{id}/progress   -> report_progress
/// POST   /{id}/complete   -> complete_job
/// POST   /{id}/fail       -> fail_job
/// POST   /{id}/release    -> release_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::submit_job))
        .route("/{id}", get(jobs::get_job))
        .route("/{id}/cancel", post(jobs::cancel_job))
        .route("/{id}/progress", post(jobs::report_progress))
        .route("/{id}/complete", post(jobs::complete_job))
        .route("/{id}/fail", post(jobs::fail_job))
        .route("/{id}/release", post(jobs::release_job))
}
