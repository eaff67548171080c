//! Periodic agent liveness sweep.
//!
//! Agent liveness is derived from heartbeat age, so an agent that simply
//! stops talking never triggers a state change by itself. The sweeper
//! re-derives the pool on a tick so the `offline_count` change still
//! reaches the bus.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolq_queue::Scheduler;

/// Default tick for the liveness sweep.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(5);

pub struct AgentSweeper {
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

impl AgentSweeper {
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        Self {
            scheduler,
            interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    /// Run the sweep loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Agent sweeper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Some(status) = self.scheduler.sweep_agents().await {
                        tracing::info!(
                            online = status.online_count,
                            offline = status.offline_count,
                            "Agent pool changed",
                        );
                    }
                }
            }
        }
    }
}
