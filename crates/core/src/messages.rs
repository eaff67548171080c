//! Real-time channel wire protocol.
//!
//! Server-to-client frames are JSON text frames carrying a
//! [`ChannelMessage`]. The channel is subscribe-only: the only thing a
//! client sends is an opaque liveness ping.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::job::Job;
use crate::pool::PoolStatus;
use crate::types::JobId;

/// Text a client sends as a liveness ping.
pub const CLIENT_PING: &str = "ping";

/// Tagged union of everything the server pushes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ChannelMessage {
    StatusUpdate(StatusPayload),
    /// Carries no state. Consumers must ignore it.
    Heartbeat,
}

/// Payload of a `status_update`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusPayload {
    Job(Box<Job>),
    Pool(PoolStatus),
}

impl ChannelMessage {
    pub fn job(job: Job) -> Self {
        Self::StatusUpdate(StatusPayload::Job(Box::new(job)))
    }

    pub fn pool(status: PoolStatus) -> Self {
        Self::StatusUpdate(StatusPayload::Pool(status))
    }

    /// Serialize to the JSON text carried in a WebSocket text frame.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// What a channel is subscribed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Every job event and every pool snapshot.
    Global,
    /// Events for a single job.
    Job(JobId),
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Topic::Global => f.write_str("global"),
            Topic::Job(id) => write!(f, "job:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::job::{JobStatus, ResourceKey, Tool, ToolMode};
    use crate::pool::PoolState;

    fn sample_job() -> Job {
        Job {
            id: uuid::Uuid::now_v7(),
            resource_key: ResourceKey::new("col_1", Tool::Photostats, ToolMode::Collection),
            target: "col_1".into(),
            tool: Tool::Photostats,
            mode: None,
            status: JobStatus::Queued,
            position: Some(1),
            scheduled_for: None,
            created_at: Utc::now(),
            queued_at: Some(Utc::now()),
            started_at: None,
            completed_at: None,
            progress: None,
            error_message: None,
            result_ref: None,
            agent_id: None,
        }
    }

    #[test]
    fn heartbeat_has_only_a_type_tag() {
        let json: serde_json::Value =
            serde_json::from_str(&ChannelMessage::Heartbeat.encode().unwrap()).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "heartbeat" }));
    }

    #[test]
    fn job_update_is_tagged_status_update() {
        let job = sample_job();
        let json = serde_json::to_value(ChannelMessage::job(job.clone())).unwrap();
        assert_eq!(json["type"], "status_update");
        assert_eq!(json["payload"]["id"], job.id.to_string());
        assert_eq!(json["payload"]["status"], "queued");
    }

    #[test]
    fn pool_payload_decodes_as_pool() {
        let text = r#"{"type":"status_update","payload":{"online_count":2,"offline_count":0,"idle_count":1,"running_jobs_count":1,"status":"running"}}"#;
        let msg = ChannelMessage::decode(text).unwrap();
        match msg {
            ChannelMessage::StatusUpdate(StatusPayload::Pool(pool)) => {
                assert_eq!(pool.online_count, 2);
                assert_eq!(pool.status, PoolState::Running);
            }
            other => panic!("expected pool payload, got {other:?}"),
        }
    }

    #[test]
    fn job_payload_decodes_as_job() {
        let job = sample_job();
        let text = ChannelMessage::job(job.clone()).encode().unwrap();
        assert_eq!(
            ChannelMessage::decode(&text).unwrap(),
            ChannelMessage::job(job)
        );
    }

    #[test]
    fn topic_display_names_job() {
        let id = uuid::Uuid::now_v7();
        assert_eq!(Topic::Global.to_string(), "global");
        assert_eq!(Topic::Job(id).to_string(), format!("job:{id}"));
    }
}
