//! Write-behind archive of job snapshots.
//!
//! [`JobArchive`] subscribes to the [`EventBus`](crate::bus::EventBus) and
//! upserts the job carried by every job event into `tool_jobs`. Pool
//! snapshots are derived state and are not archived. It runs as a
//! long-lived background task and stops when the bus sender is dropped.

use std::future::Future;

use tokio::sync::broadcast;
use toolq_core::job::Job;
use toolq_db::repositories::JobRepo;
use toolq_db::DbPool;

use crate::bus::QueueEvent;

/// Background service that persists job snapshots to the database.
pub struct JobArchive;

impl JobArchive {
    /// Run the archive loop.
    ///
    /// `resync` returns every job the scheduler currently holds. It is
    /// called when the receiver lags: skipped events may have been the
    /// last change to a job, so every live job is rewritten. Events still
    /// buffered after the gap are newer than the skipped ones and are
    /// applied on top.
    pub async fn run<F, Fut>(pool: DbPool, mut receiver: broadcast::Receiver<QueueEvent>, resync: F)
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Vec<Job>>,
    {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    let Some(job) = event.job() else {
                        continue;
                    };
                    if let Err(e) = JobRepo::upsert(&pool, job).await {
                        tracing::error!(
                            error = %e,
                            job_id = %job.id,
                            event_type = event.event_type(),
                            "Failed to archive job snapshot"
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    let jobs = resync().await;
                    tracing::warn!(
                        skipped = n,
                        resynced = jobs.len(),
                        "Job archive lagged, rewriting all live jobs"
                    );
                    Self::write_all(&pool, &jobs).await;
                }
                Err(broadcast::error::RecvError::Closed) => {
                    tracing::info!("Event bus closed, job archive shutting down");
                    break;
                }
            }
        }
    }

    async fn write_all(pool: &DbPool, jobs: &[Job]) {
        for job in jobs {
            if let Err(e) = JobRepo::upsert(pool, job).await {
                tracing::error!(error = %e, job_id = %job.id, "Failed to resync job snapshot");
            }
        }
    }
}
