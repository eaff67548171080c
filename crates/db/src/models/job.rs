//! Row model for the `tool_jobs` table.

use serde::Serialize;
use sqlx::FromRow;
use toolq_core::error::CoreError;
use toolq_core::job::{Job, ResourceKey, ToolMode};
use toolq_core::types::{JobId, Timestamp};

/// A row from the `tool_jobs` table.
///
/// Enumerations are stored by their wire names so the table stays
/// readable from `psql`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobRow {
    pub id: JobId,
    pub resource_key: String,
    pub target: String,
    pub tool: String,
    pub mode: Option<String>,
    pub status: String,
    pub scheduled_for: Option<Timestamp>,
    pub created_at: Timestamp,
    pub queued_at: Option<Timestamp>,
    pub started_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub progress: Option<serde_json::Value>,
    pub error_message: Option<String>,
    pub result_ref: Option<String>,
    pub agent_id: Option<String>,
    pub updated_at: Timestamp,
}

impl TryFrom<JobRow> for Job {
    type Error = CoreError;

    /// Rebuild the public job view. `position` is not stored; the
    /// scheduler recomputes it when the job is restored.
    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            resource_key: ResourceKey::from_canonical(row.resource_key),
            target: row.target,
            tool: row.tool.parse()?,
            mode: row
                .mode
                .as_deref()
                .map(str::parse::<ToolMode>)
                .transpose()?,
            status: row.status.parse()?,
            position: None,
            scheduled_for: row.scheduled_for,
            created_at: row.created_at,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            progress: row.progress,
            error_message: row.error_message,
            result_ref: row.result_ref,
            agent_id: row.agent_id,
        })
    }
}
