use std::str::FromStr;
use std::time::Duration;

/// A configuration variable was present but could not be parsed.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a valid {expected}, got {value:?}")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Snapshot archive. Disabled when unset.
    pub database_url: Option<String>,
    /// Global cap on running jobs (default: `1`).
    pub max_concurrent_jobs: usize,
    pub ws_heartbeat_interval_secs: u64,
    /// Channels silent for longer than this are closed.
    pub ws_idle_timeout_secs: u64,
    /// Per-connection outbound queue length.
    pub channel_buffer: usize,
    pub pool_push_min_interval_ms: u64,
    pub agent_offline_secs: u64,
    /// How often scheduled jobs are checked for promotion.
    pub promote_interval_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            cors_origins: vec!["http://localhost:5173".into()],
            request_timeout_secs: 30,
            database_url: None,
            max_concurrent_jobs: 1,
            ws_heartbeat_interval_secs: 25,
            ws_idle_timeout_secs: 90,
            channel_buffer: 64,
            pool_push_min_interval_ms: 1_000,
            agent_offline_secs: toolq_core::pool::DEFAULT_AGENT_OFFLINE_SECS,
            promote_interval_ms: 1_000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                      | Default                 |
    /// |------------------------------|-------------------------|
    /// | `HOST`                       | `0.0.0.0`               |
    /// | `PORT`                       | `3000`                  |
    /// | `CORS_ORIGINS`               | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`       | `30`                    |
    /// | `DATABASE_URL`               | unset                   |
    /// | `MAX_CONCURRENT_JOBS`        | `1`                     |
    /// | `WS_HEARTBEAT_INTERVAL_SECS` | `25`                    |
    /// | `WS_IDLE_TIMEOUT_SECS`       | `90`                    |
    /// | `CHANNEL_BUFFER`             | `64`                    |
    /// | `POOL_PUSH_MIN_INTERVAL_MS`  | `1000`                  |
    /// | `AGENT_OFFLINE_SECS`         | `120`                   |
    /// | `PROMOTE_INTERVAL_MS`        | `1000`                  |
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let host = std::env::var("HOST").unwrap_or(defaults.host);

        let cors_origins = match std::env::var("CORS_ORIGINS") {
            Ok(raw) => parse_origins(&raw),
            Err(_) => defaults.cors_origins,
        };

        let database_url = std::env::var("DATABASE_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        Ok(Self {
            host,
            port: env_or("PORT", defaults.port, "u16")?,
            cors_origins,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", defaults.request_timeout_secs, "u64")?,
            database_url,
            max_concurrent_jobs: positive(
                "MAX_CONCURRENT_JOBS",
                env_or("MAX_CONCURRENT_JOBS", defaults.max_concurrent_jobs, "usize")?,
            )?,
            ws_heartbeat_interval_secs: positive(
                "WS_HEARTBEAT_INTERVAL_SECS",
                env_or(
                    "WS_HEARTBEAT_INTERVAL_SECS",
                    defaults.ws_heartbeat_interval_secs,
                    "u64",
                )?,
            )?,
            ws_idle_timeout_secs: env_or("WS_IDLE_TIMEOUT_SECS", defaults.ws_idle_timeout_secs, "u64")?,
            channel_buffer: positive(
                "CHANNEL_BUFFER",
                env_or("CHANNEL_BUFFER", defaults.channel_buffer, "usize")?,
            )?,
            pool_push_min_interval_ms: env_or(
                "POOL_PUSH_MIN_INTERVAL_MS",
                defaults.pool_push_min_interval_ms,
                "u64",
            )?,
            agent_offline_secs: offline_window(
                "AGENT_OFFLINE_SECS",
                env_or("AGENT_OFFLINE_SECS", defaults.agent_offline_secs, "u64")?,
            )?,
            promote_interval_ms: positive(
                "PROMOTE_INTERVAL_MS",
                env_or("PROMOTE_INTERVAL_MS", defaults.promote_interval_ms, "u64")?,
            )?,
        })
    }

    pub fn ws_heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.ws_heartbeat_interval_secs)
    }

    pub fn ws_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.ws_idle_timeout_secs)
    }

    pub fn pool_push_min_interval(&self) -> Duration {
        Duration::from_millis(self.pool_push_min_interval_ms)
    }

    pub fn promote_interval(&self) -> Duration {
        Duration::from_millis(self.promote_interval_ms)
    }

    pub fn scheduler_config(&self) -> toolq_queue::SchedulerConfig {
        toolq_queue::SchedulerConfig {
            max_concurrent_jobs: self.max_concurrent_jobs,
            agent_offline_after: seconds_delta(self.agent_offline_secs)
                .unwrap_or(chrono::TimeDelta::MAX),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn env_or<T: FromStr>(var: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            var,
            expected,
            value,
        }),
        Err(_) => Ok(default),
    }
}

fn positive<T: PartialEq + Default + ToString>(var: &'static str, value: T) -> Result<T, ConfigError> {
    if value == T::default() {
        return Err(ConfigError::Invalid {
            var,
            expected: "positive number",
            value: value.to_string(),
        });
    }
    Ok(value)
}

fn seconds_delta(secs: u64) -> Option<chrono::TimeDelta> {
    i64::try_from(secs).ok().and_then(chrono::TimeDelta::try_seconds)
}

/// Reject windows too large to add to a timestamp.
fn offline_window(var: &'static str, secs: u64) -> Result<u64, ConfigError> {
    match seconds_delta(secs) {
        Some(_) => Ok(secs),
        None => Err(ConfigError::Invalid {
            var,
            expected: "number of seconds within the timestamp range",
            value: secs.to_string(),
        }),
    }
}
