use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use toolq_core::error::CoreError;

/// Handler error. Renders as `{ "error": msg, "code": CODE }` with the
/// status derived from the variant; conflicts also name the active job.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::DuplicateJob {
                    resource_key,
                    existing_job_id,
                } => {
                    let body = json!({
                        "error": format!("A job for {resource_key} is already active"),
                        "code": "CONFLICT",
                        "existing_job_id": existing_job_id,
                    });
                    return (StatusCode::CONFLICT, axum::Json(body)).into_response();
                }
                CoreError::PreconditionFailed(msg) => (
                    StatusCode::PRECONDITION_FAILED,
                    "PRECONDITION_FAILED",
                    msg.clone(),
                ),
                CoreError::Transport(msg) => {
                    tracing::warn!(error = %msg, "Transport error");
                    (StatusCode::BAD_GATEWAY, "TRANSPORT_ERROR", msg.clone())
                }
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}
