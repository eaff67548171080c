use crate::types::JobId;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Another active job already holds the resource key.
    #[error("Conflict: job {existing_job_id} is already active for {resource_key}")]
    DuplicateJob {
        resource_key: String,
        existing_job_id: JobId,
    },

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    /// Real-time channel dropped. Only surfaced once reconnects are exhausted.
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Shorthand for a missing job.
    pub fn job_not_found(id: JobId) -> Self {
        Self::NotFound {
            entity: "Job",
            id: id.to_string(),
        }
    }
}
