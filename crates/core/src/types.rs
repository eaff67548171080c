/// Opaque job identifier (UUID v7, so ids sort by creation time).
pub type JobId = uuid::Uuid;

/// Agents pick their own identifier when they first heartbeat.
pub type AgentId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
