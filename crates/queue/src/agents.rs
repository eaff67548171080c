//! Registry of worker agents that have reported a heartbeat.
//!
//! Liveness is derived, not stored: an agent is online while its last
//! heartbeat is younger than the offline threshold. Nothing is ever
//! evicted, so an agent that went quiet still counts towards
//! `offline_count`.

use std::collections::BTreeMap;

use chrono::Duration;
use toolq_core::error::CoreError;
use toolq_core::pool::AgentView;
use toolq_core::types::{AgentId, JobId, Timestamp};

/// Maximum length of an agent id or display name.
const MAX_AGENT_ID_LEN: usize = 128;

#[derive(Debug, Clone)]
struct AgentRecord {
    name: String,
    first_seen_at: Timestamp,
    last_heartbeat_at: Timestamp,
    current_job_id: Option<JobId>,
}

#[derive(Debug)]
pub struct AgentRegistry {
    agents: BTreeMap<AgentId, AgentRecord>,
    offline_after: Duration,
}

impl AgentRegistry {
    pub fn new(offline_after: Duration) -> Self {
        Self {
            agents: BTreeMap::new(),
            offline_after,
        }
    }

    /// Register or refresh an agent. `name` defaults to the id on first
    /// sight and is only overwritten when supplied.
    pub fn heartbeat(
        &mut self,
        id: &str,
        name: Option<String>,
        now: Timestamp,
    ) -> Result<AgentView, CoreError> {
        validate_agent_id(id)?;
        let record = self
            .agents
            .entry(id.to_string())
            .or_insert_with(|| AgentRecord {
                name: id.to_string(),
                first_seen_at: now,
                last_heartbeat_at: now,
                current_job_id: None,
            });
        record.last_heartbeat_at = now;
        if let Some(name) = name.filter(|n| !n.trim().is_empty()) {
            record.name = name;
        }
        let record = record.clone();
        Ok(self.to_view(id, &record, now))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.agents.contains_key(id)
    }

    pub fn is_online(&self, id: &str, now: Timestamp) -> bool {
        self.agents
            .get(id)
            .is_some_and(|r| self.online(r, now))
    }

    pub fn current_job(&self, id: &str) -> Option<JobId> {
        self.agents.get(id).and_then(|r| r.current_job_id)
    }

    /// Record which job an agent holds. Unknown agents are ignored.
    pub fn set_current_job(&mut self, id: &str, job: Option<JobId>) {
        if let Some(record) = self.agents.get_mut(id) {
            record.current_job_id = job;
        }
    }

    pub fn view(&self, id: &str, now: Timestamp) -> Option<AgentView> {
        self.agents.get(id).map(|r| self.to_view(id, r, now))
    }

    /// All agents, ordered by id.
    pub fn views(&self, now: Timestamp) -> Vec<AgentView> {
        self.agents
            .iter()
            .map(|(id, r)| self.to_view(id, r, now))
            .collect()
    }

    fn online(&self, record: &AgentRecord, now: Timestamp) -> bool {
        now - record.last_heartbeat_at <= self.offline_after
    }

    fn to_view(&self, id: &str, record: &AgentRecord, now: Timestamp) -> AgentView {
        AgentView {
            id: id.to_string(),
            name: record.name.clone(),
            online: self.online(record, now),
            first_seen_at: record.first_seen_at,
            last_heartbeat_at: record.last_heartbeat_at,
            current_job_id: record.current_job_id,
        }
    }
}

/// Validate an agent identifier.
///
/// Rules:
/// - Must not be empty.
/// - Must not exceed `MAX_AGENT_ID_LEN` characters.
/// - Only alphanumeric, hyphen, underscore or dot characters.
pub fn validate_agent_id(id: &str) -> Result<(), CoreError> {
    if id.is_empty() {
        return Err(CoreError::Validation(
            "Agent id must not be empty".to_string(),
        ));
    }
    if id.len() > MAX_AGENT_ID_LEN {
        return Err(CoreError::Validation(format!(
            "Agent id must not exceed {MAX_AGENT_ID_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(CoreError::Validation(
            "Agent id may only contain alphanumeric, hyphen, underscore, or dot characters"
                .to_string(),
        ));
    }
    Ok(())
}
