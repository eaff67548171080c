//! Reconnect-with-backoff contract for real-time channel clients.
//!
//! The policy is pure (no timers) so both the agent's channel client and
//! any other consumer can drive it from their own event loop.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default delay before the first reconnect attempt.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default interval between client liveness pings.
pub const DEFAULT_PING_INTERVAL_SECS: u64 = 25;

/// Exponential backoff: `base * 2^attempt`, bounded attempt count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Client-visible channel state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelState {
    Connecting,
    Open,
    /// Closed, a reconnect is pending.
    Closed,
    /// Reconnects exhausted or torn down. Terminal.
    Disconnected,
}

/// What to do after the channel closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then make reconnect attempt number `attempt` (1-based).
    Retry { attempt: u32, delay: Duration },
    GiveUp,
}

/// Attempt counter driven by open/close events.
#[derive(Debug, Clone)]
pub struct ReconnectState {
    policy: ReconnectPolicy,
    attempts: u32,
}

impl ReconnectState {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
        }
    }

    /// A successful open resets the attempt budget.
    pub fn on_open(&mut self) {
        self.attempts = 0;
    }

    /// Called when the channel closed or a connect attempt failed.
    pub fn on_close(&mut self) -> ReconnectDecision {
        if self.attempts >= self.policy.max_attempts {
            return ReconnectDecision::GiveUp;
        }
        let delay = self.policy.delay_for(self.attempts);
        self.attempts += 1;
        ReconnectDecision::Retry {
            attempt: self.attempts,
            delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_delays_double_from_one_second() {
        let policy = ReconnectPolicy::default();
        let delays: Vec<u64> = (0..5).map(|n| policy.delay_for(n).as_millis() as u64).collect();
        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 16_000]);
    }

    #[test]
    fn gives_up_after_five_attempts() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        let mut delays = Vec::new();
        loop {
            match state.on_close() {
                ReconnectDecision::Retry { delay, .. } => delays.push(delay.as_secs()),
                ReconnectDecision::GiveUp => break,
            }
        }
        assert_eq!(delays, vec![1, 2, 4, 8, 16]);
        assert_eq!(state.attempts(), 5);
        assert_eq!(state.on_close(), ReconnectDecision::GiveUp);
    }

    #[test]
    fn attempts_are_numbered_from_one() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        assert_eq!(
            state.on_close(),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn open_resets_the_budget() {
        let mut state = ReconnectState::new(ReconnectPolicy::default());
        state.on_close();
        state.on_close();
        state.on_open();
        assert_eq!(
            state.on_close(),
            ReconnectDecision::Retry {
                attempt: 1,
                delay: Duration::from_secs(1)
            }
        );
    }

    #[test]
    fn huge_attempt_saturates_instead_of_overflowing() {
        let policy = ReconnectPolicy::default();
        assert!(policy.delay_for(64) >= policy.delay_for(10));
    }
}
