//! Request bodies for the agent-facing endpoints.

use serde::{Deserialize, Serialize};

use crate::types::AgentId;

/// Body of `POST /api/v1/agents/{id}/heartbeat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Display name; the agent id is used when never supplied.
    #[serde(default)]
    pub name: Option<String>,
}

/// Body of `POST /api/v1/jobs/{id}/progress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub agent_id: AgentId,
    pub progress: serde_json::Value,
}

/// Body of `POST /api/v1/jobs/{id}/complete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompleteReport {
    pub agent_id: AgentId,
    pub result_ref: String,
}

/// Body of `POST /api/v1/jobs/{id}/fail`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailReport {
    pub agent_id: AgentId,
    pub error_message: String,
}

/// Body of `POST /api/v1/jobs/{id}/release`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRequest {
    pub agent_id: AgentId,
}
