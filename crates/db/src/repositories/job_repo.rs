//! Repository for the `tool_jobs` snapshot table.

use sqlx::PgPool;
use toolq_core::job::Job;

use crate::models::job::JobRow;

/// Column list for `tool_jobs` queries.
const COLUMNS: &str = "\
    id, resource_key, target, tool, mode, status, \
    scheduled_for, created_at, queued_at, started_at, completed_at, \
    progress, error_message, result_ref, agent_id, updated_at";

/// Snapshot persistence for tool jobs.
pub struct JobRepo;

impl JobRepo {
    /// Insert or overwrite the snapshot for `job`.
    ///
    /// Snapshots are last-write-wins: the archive receives them in the
    /// order the scheduler published them.
    pub async fn upsert(pool: &PgPool, job: &Job) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO tool_jobs \
                (id, resource_key, target, tool, mode, status, scheduled_for, created_at, \
                 queued_at, started_at, completed_at, progress, error_message, result_ref, \
                 agent_id, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, NOW()) \
             ON CONFLICT (id) DO UPDATE SET \
                status = EXCLUDED.status, \
                queued_at = EXCLUDED.queued_at, \
                started_at = EXCLUDED.started_at, \
                completed_at = EXCLUDED.completed_at, \
                progress = EXCLUDED.progress, \
                error_message = EXCLUDED.error_message, \
                result_ref = EXCLUDED.result_ref, \
                agent_id = EXCLUDED.agent_id, \
                updated_at = NOW()",
        )
        .bind(job.id)
        .bind(job.resource_key.as_str())
        .bind(&job.target)
        .bind(job.tool.as_str())
        .bind(job.mode.map(|m| m.as_str()))
        .bind(job.status.as_str())
        .bind(job.scheduled_for)
        .bind(job.created_at)
        .bind(job.queued_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(&job.progress)
        .bind(&job.error_message)
        .bind(&job.result_ref)
        .bind(&job.agent_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// All snapshots, oldest first. Used once at startup.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<JobRow>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM tool_jobs ORDER BY created_at ASC, id ASC");
        sqlx::query_as::<_, JobRow>(&query).fetch_all(pool).await
    }
}
