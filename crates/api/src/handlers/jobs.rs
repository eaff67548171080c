//! Handlers for the `/jobs` resource.
//!
//! Client operations (submit, list, get, cancel) and the worker reports
//! (progress, complete, fail, release). Every call goes straight to the
//! [`Scheduler`](toolq_queue::Scheduler); the resulting channel pushes are
//! produced by the scheduler's events, not here.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use toolq_core::job::{JobStatus, SubmitJob};
use toolq_core::types::JobId;
use toolq_core::worker::{CompleteReport, FailReport, ProgressReport, ReleaseRequest};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

/// Query parameters for `GET /jobs`.
#[derive(Debug, Deserialize)]
pub struct JobListQuery {
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Client operations
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Submit a tool run. Returns 201 with the created job, or 409 with the
/// id of the job already holding the same target/tool/mode.
pub async fn submit_job(
    State(state): State<AppState>,
    Json(input): Json<SubmitJob>,
) -> AppResult<impl IntoResponse> {
    let job = state.scheduler.submit(input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/jobs
///
/// List jobs in submission order, optionally filtered by `status`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let status = params
        .status
        .as_deref()
        .map(str::parse::<JobStatus>)
        .transpose()?;
    let jobs = state.scheduler.list(status).await;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.scheduler.get(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/cancel
///
/// Cancel a scheduled or queued job. Running and finished jobs answer 412.
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
) -> AppResult<impl IntoResponse> {
    let job = state.scheduler.cancel(job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

// ---------------------------------------------------------------------------
// Worker reports
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/progress
pub async fn report_progress(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<ProgressReport>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .scheduler
        .report_progress(job_id, &input.agent_id, input.progress)
        .await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/complete
pub async fn complete_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<CompleteReport>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .scheduler
        .complete(job_id, &input.agent_id, input.result_ref)
        .await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/fail
///
/// The worker's error message is stored on the job; a successful call
/// returns 200 with the failed job.
pub async fn fail_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<FailReport>,
) -> AppResult<impl IntoResponse> {
    let job = state
        .scheduler
        .fail(job_id, &input.agent_id, input.error_message)
        .await?;
    Ok(Json(DataResponse { data: job }))
}

/// POST /api/v1/jobs/{id}/release
///
/// Hand a claimed job back to the queue before it started producing
/// progress.
pub async fn release_job(
    State(state): State<AppState>,
    Path(job_id): Path<JobId>,
    Json(input): Json<ReleaseRequest>,
) -> AppResult<impl IntoResponse> {
    let job = state.scheduler.release(job_id, &input.agent_id).await?;
    Ok(Json(DataResponse { data: job }))
}
