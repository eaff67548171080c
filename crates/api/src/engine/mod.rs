//! Background tasks that drive time-based queue transitions and keep the
//! job archive in step with the scheduler.

mod archive;

mod liveness;
mod promoter;

pub use archive::{restore_jobs, spawn_archive};
pub use liveness::AgentSweeper;
pub use promoter::ScheduledPromoter;
