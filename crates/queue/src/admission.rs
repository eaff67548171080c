//! Admission guard: refuses a submission whose resource key is already
//! held by a scheduled, queued or running job.
//!
//! The check is only meaningful when it runs under the same lock as the
//! insert that follows it; [`Scheduler::submit`](crate::Scheduler::submit)
//! guarantees that.

use toolq_core::error::CoreError;
use toolq_core::job::ResourceKey;

use crate::store::JobStore;

/// Admit a new job for `key`, or name the job that blocks it.
pub fn admit(store: &JobStore, key: &ResourceKey) -> Result<(), CoreError> {
    match store.active_job_for(key) {
        Some(existing_job_id) => Err(CoreError::DuplicateJob {
            resource_key: key.to_string(),
            existing_job_id,
        }),
        None => Ok(()),
    }
}
