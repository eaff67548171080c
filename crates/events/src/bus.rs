//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is the fan-out point for every [`QueueEvent`] the scheduler
//! produces. It is designed to be shared via `Arc<EventBus>`.

use serde::Serialize;
use tokio::sync::broadcast;
use toolq_core::job::{Job, JobStatus};
use toolq_core::pool::PoolStatus;

// ---------------------------------------------------------------------------
// QueueEvent
// ---------------------------------------------------------------------------

/// A change in queue or pool state.
///
/// Each scheduler transition produces exactly one job event; each change
/// in the derived pool status produces exactly one `PoolStatus` event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum QueueEvent {
    /// A submission was admitted.
    JobCreated { job: Job },
    /// A job moved from `from` to `job.status`.
    JobTransitioned { from: JobStatus, job: Job },
    /// A running job reported progress. Status is unchanged.
    JobProgress { job: Job },
    /// The derived pool status changed.
    PoolStatus { status: PoolStatus },
}

impl QueueEvent {
    /// The job this event is about, if any.
    pub fn job(&self) -> Option<&Job> {
        match self {
            QueueEvent::JobCreated { job }
            | QueueEvent::JobTransitioned { job, .. }
            | QueueEvent::JobProgress { job } => Some(job),
            QueueEvent::PoolStatus { .. } => None,
        }
    }

    /// Dot-separated name for logs.
    pub fn event_type(&self) -> &'static str {
        match self {
            QueueEvent::JobCreated { .. } => "job.created",
            QueueEvent::JobTransitioned { .. } => "job.transitioned",
            QueueEvent::JobProgress { .. } => "job.progress",
            QueueEvent::PoolStatus { .. } => "pool.status",
        }
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// Wraps a [`broadcast::Sender`] so that any number of subscribers can
/// independently receive every published [`QueueEvent`].
///
/// # Usage
///
/// ```rust
/// use toolq_core::pool::PoolStatus;
/// use toolq_events::bus::{EventBus, QueueEvent};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(QueueEvent::PoolStatus { status: PoolStatus::derive(&[], 0) });
/// ```
pub struct EventBus {
    sender: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers. Never blocks.
    ///
    /// If there are no active subscribers the event is silently dropped.
    pub fn publish(&self, event: QueueEvent) {
        tracing::trace!(event_type = event.event_type(), "Publishing queue event");
        // Ignore the SendError, it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
