//! Moves scheduled jobs into the queue once their time has come.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolq_queue::Scheduler;

/// A single long-lived task that calls [`Scheduler::promote_due`] on a
/// fixed tick.
pub struct ScheduledPromoter {
    scheduler: Arc<Scheduler>,
    poll_interval: Duration,
}

impl ScheduledPromoter {
    pub fn new(scheduler: Arc<Scheduler>, poll_interval: Duration) -> Self {
        Self {
            scheduler,
            poll_interval,
        }
    }

    /// Run the promoter loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Scheduled job promoter started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Scheduled job promoter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let promoted = self.scheduler.promote_due().await;
                    if !promoted.is_empty() {
                        tracing::debug!(count = promoted.len(), "Promoted scheduled jobs");
                    }
                }
            }
        }
    }
}
