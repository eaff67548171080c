//! Queue event bus and its consumers.
//!
//! - [`EventBus`]: in-process publish/subscribe hub backed by
//!   `tokio::sync::broadcast`, carrying [`QueueEvent`]s.
//! - [`PoolSnapshotGate`]: drops duplicate pool snapshots and spaces out
//!   bursts so channel pushes stay at most one per interval.
//! - [`JobArchive`]: background service writing job snapshots to
//!   PostgreSQL.

pub mod archive;
pub mod bus;
pub mod gate;

pub use archive::JobArchive;
pub use bus::{EventBus, QueueEvent};
pub use gate::{GateDecision, PoolSnapshotGate};
