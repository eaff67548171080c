//! Aggregate views over the queue and the agent pool.
//!
//! Nothing here is stored: both snapshots are derived from the job store
//! and the agent registry every time they are requested.

use serde::{Deserialize, Serialize};

use crate::types::{AgentId, JobId, Timestamp};

/// If an agent has not sent a heartbeat within this many seconds it is
/// reported offline.
pub const DEFAULT_AGENT_OFFLINE_SECS: u64 = 120;

/// Coarse pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolState {
    Running,
    Idle,
}

/// Snapshot of worker availability and queue activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub online_count: u32,
    pub offline_count: u32,
    pub idle_count: u32,
    pub running_jobs_count: u32,
    pub status: PoolState,
}

impl PoolStatus {
    /// Derive the pool snapshot from the agent list and the number of jobs
    /// currently running.
    pub fn derive(agents: &[AgentView], running_jobs_count: usize) -> Self {
        let online_count = agents.iter().filter(|a| a.online).count();
        let idle_count = agents
            .iter()
            .filter(|a| a.online && a.current_job_id.is_none())
            .count();

        Self {
            online_count: online_count as u32,
            offline_count: (agents.len() - online_count) as u32,
            idle_count: idle_count as u32,
            running_jobs_count: running_jobs_count as u32,
            status: if running_jobs_count > 0 {
                PoolState::Running
            } else {
                PoolState::Idle
            },
        }
    }
}

/// Agent as seen by the API (`useAgentDetail`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub name: String,
    pub online: bool,
    pub first_seen_at: Timestamp,
    pub last_heartbeat_at: Timestamp,
    pub current_job_id: Option<JobId>,
}

/// Response for `GET /api/v1/queue/status`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub queued_count: u32,
    pub running_count: u32,
    pub scheduled_count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
    pub cancelled_count: u32,
    /// The longest-running job, if any is running.
    pub current_job_id: Option<JobId>,
}
