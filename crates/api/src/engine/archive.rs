//! Glue between the scheduler and the PostgreSQL job archive.

use std::sync::{Arc, Weak};

use tokio::task::JoinHandle;
use toolq_core::job::Job;
use toolq_db::repositories::JobRepo;
use toolq_db::DbPool;
use toolq_events::{EventBus, JobArchive};
use toolq_queue::Scheduler;

/// Spawn the archive on `bus`, resyncing from `scheduler` when it lags.
///
/// Only a weak handle is kept, so the archive never holds the scheduler,
/// and with it the bus, alive past shutdown.
pub fn spawn_archive(pool: DbPool, bus: &EventBus, scheduler: &Arc<Scheduler>) -> JoinHandle<()> {
    let scheduler = Arc::downgrade(scheduler);
    tokio::spawn(JobArchive::run(pool, bus.subscribe(), move || {
        live_jobs(scheduler.clone())
    }))
}

/// Every job the scheduler holds, or nothing once it has been dropped.
async fn live_jobs(scheduler: Weak<Scheduler>) -> Vec<Job> {
    match scheduler.upgrade() {
        Some(scheduler) => scheduler.list(None).await,
        None => Vec::new(),
    }
}

/// Rebuild the scheduler from the archived snapshots.
///
/// Rows that no longer parse are skipped; the server starts regardless.
/// Returns how many jobs were restored.
pub async fn restore_jobs(pool: &DbPool, scheduler: &Scheduler) -> usize {
    let rows = match JobRepo::list_all(pool).await {
        Ok(rows) => rows,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load archived jobs, starting empty");
            return 0;
        }
    };

    let jobs: Vec<Job> = rows
        .into_iter()
        .filter_map(|row| {
            let id = row.id;
            match Job::try_from(row) {
                Ok(job) => Some(job),
                Err(e) => {
                    tracing::warn!(job_id = %id, error = %e, "Skipping unreadable archived job");
                    None
                }
            }
        })
        .collect();

    match scheduler.restore(jobs).await {
        Ok(count) => {
            tracing::info!(count, "Restored jobs from archive");
            count
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to restore archived jobs");
            0
        }
    }
}
