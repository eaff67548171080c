//! Tool job queue: record store, admission guard, scheduler and the agent
//! registry that feeds pool status.
//!
//! [`Scheduler`] is the single owner of mutable queue state. Every
//! operation takes one global lock, mutates the [`JobStore`] and the
//! [`AgentRegistry`] together, and publishes the resulting events before
//! releasing it, so per-key transitions reach the bus in order.

pub mod admission;
pub mod agents;
pub mod scheduler;
pub mod store;

pub use agents::AgentRegistry;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use store::JobStore;
