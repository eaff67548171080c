use std::str::FromStr;
use std::time::Duration;

use toolq_core::backoff::DEFAULT_PING_INTERVAL_SECS;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Worker agent configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// REST base, including the `/api/v1` prefix.
    pub api_url: String,
    /// Global channel endpoint.
    pub ws_url: String,
    pub agent_id: String,
    pub agent_name: Option<String>,
    pub heartbeat_interval: Duration,
    /// Fallback poll when no channel push wakes the worker.
    pub claim_poll_interval: Duration,
    pub ping_interval: Duration,
}

impl AgentConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                | Default                           |
    /// |------------------------|-----------------------------------|
    /// | `TOOLQ_API_URL`        | `http://localhost:3000/api/v1`    |
    /// | `TOOLQ_WS_URL`         | `ws://localhost:3000/api/v1/ws`   |
    /// | `AGENT_ID`             | `agent-<random>`                  |
    /// | `AGENT_NAME`           | the agent id                      |
    /// | `AGENT_HEARTBEAT_SECS` | `25`                              |
    /// | `CLAIM_POLL_SECS`      | `2`                               |
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_url = std::env::var("TOOLQ_API_URL")
            .unwrap_or_else(|_| "http://localhost:3000/api/v1".into())
            .trim_end_matches('/')
            .to_string();
        let ws_url = std::env::var("TOOLQ_WS_URL")
            .unwrap_or_else(|_| "ws://localhost:3000/api/v1/ws".into());
        let agent_id = std::env::var("AGENT_ID").unwrap_or_else(|_| {
            let suffix = uuid::Uuid::new_v4().simple().to_string();
            format!("agent-{}", &suffix[..8])
        });
        let agent_name = std::env::var("AGENT_NAME").ok();

        Ok(Self {
            api_url,
            ws_url,
            agent_id,
            agent_name,
            heartbeat_interval: Duration::from_secs(env_or("AGENT_HEARTBEAT_SECS", 25)?),
            claim_poll_interval: Duration::from_secs(env_or("CLAIM_POLL_SECS", 2)?),
            ping_interval: Duration::from_secs(DEFAULT_PING_INTERVAL_SECS),
        })
    }
}

fn env_or<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected: "number",
            value,
        }),
        Err(_) => Ok(default),
    }
}
