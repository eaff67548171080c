//! Queue-event to channel fan-out.
//!
//! [`ChannelBroadcaster`] subscribes to the event bus and turns every
//! [`QueueEvent`] into a `status_update` frame. Job updates go to the
//! job's own topic and to the global feed; pool snapshots go to the global
//! feed only, throttled by a [`PoolSnapshotGate`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use toolq_core::messages::{ChannelMessage, Topic};
use toolq_core::pool::PoolStatus;
use toolq_events::{GateDecision, PoolSnapshotGate, QueueEvent};

use crate::ws::manager::{encode, WsManager};

pub struct ChannelBroadcaster {
    ws_manager: Arc<WsManager>,
    gate: PoolSnapshotGate,
    /// When the deferred pool snapshot is due.
    flush_at: Option<Instant>,
}

impl ChannelBroadcaster {
    pub fn new(ws_manager: Arc<WsManager>, pool_push_min_interval: Duration) -> Self {
        Self {
            ws_manager,
            gate: PoolSnapshotGate::new(pool_push_min_interval),
            flush_at: None,
        }
    }

    /// Run the fan-out loop until `cancel` fires or the bus closes.
    pub async fn run(
        mut self,
        mut receiver: broadcast::Receiver<QueueEvent>,
        cancel: CancellationToken,
    ) {
        loop {
            let flush_at = self.flush_at;
            let flush = async move {
                match flush_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };

            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Channel broadcaster shutting down");
                    break;
                }
                _ = flush => {
                    self.flush_at = None;
                    if let Some(status) = self.gate.flush(Instant::now().into_std()) {
                        self.push_pool(status).await;
                    }
                }
                received = receiver.recv() => match received {
                    Ok(event) => self.dispatch(event).await,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Channel broadcaster lagged, clients should refetch");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Event bus closed, channel broadcaster shutting down");
                        break;
                    }
                },
            }
        }
    }

    async fn dispatch(&mut self, event: QueueEvent) {
        match event {
            QueueEvent::JobCreated { job }
            | QueueEvent::JobTransitioned { job, .. }
            | QueueEvent::JobProgress { job } => {
                let topic = Topic::Job(job.id);
                let Some(frame) = encode(&ChannelMessage::job(job)) else {
                    return;
                };
                let direct = self.ws_manager.publish(topic, frame.clone()).await;
                let global = self.ws_manager.publish(Topic::Global, frame).await;
                tracing::trace!(topic = %topic, direct, global, "Job update pushed");
            }
            QueueEvent::PoolStatus { status } => {
                let now = Instant::now();
                match self.gate.offer(status.clone(), now.into_std()) {
                    GateDecision::Send => self.push_pool(status).await,
                    GateDecision::Defer(delay) => {
                        if self.flush_at.is_none() {
                            self.flush_at = Some(now + delay);
                        }
                    }
                    GateDecision::Skip => {}
                }
            }
        }
    }

    async fn push_pool(&self, status: PoolStatus) {
        if let Some(frame) = encode(&ChannelMessage::pool(status)) {
            let sent = self.ws_manager.publish(Topic::Global, frame).await;
            tracing::trace!(sent, "Pool snapshot pushed");
        }
    }
}
