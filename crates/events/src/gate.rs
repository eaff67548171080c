//! Throttle for pool status pushes.
//!
//! Job transitions are always pushed immediately. Pool snapshots can flap
//! (every heartbeat may recompute one), so channel pushes go through
//! [`PoolSnapshotGate`]: unchanged snapshots are skipped, and a snapshot
//! arriving within `min_interval` of the previous push is held back and
//! flushed later, latest value wins.

use std::time::{Duration, Instant};

use toolq_core::pool::PoolStatus;

/// Default minimum spacing between two pool pushes.
pub const DEFAULT_POOL_PUSH_INTERVAL: Duration = Duration::from_millis(1_000);

/// What the caller should do with an offered snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Push it now.
    Send,
    /// Held back; call [`PoolSnapshotGate::flush`] after this delay.
    Defer(Duration),
    /// Identical to what clients already have.
    Skip,
}

#[derive(Debug)]
pub struct PoolSnapshotGate {
    min_interval: Duration,
    last_sent: Option<(Instant, PoolStatus)>,
    pending: Option<PoolStatus>,
}

impl PoolSnapshotGate {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent: None,
            pending: None,
        }
    }

    /// Offer a freshly published snapshot.
    pub fn offer(&mut self, snapshot: PoolStatus, now: Instant) -> GateDecision {
        match &self.last_sent {
            Some((_, sent)) if *sent == snapshot => {
                // Whatever was pending is superseded by a return to the
                // value clients already hold.
                self.pending = None;
                GateDecision::Skip
            }
            Some((at, _)) if now.duration_since(*at) < self.min_interval => {
                self.pending = Some(snapshot);
                GateDecision::Defer(self.min_interval - now.duration_since(*at))
            }
            _ => {
                self.pending = None;
                self.last_sent = Some((now, snapshot));
                GateDecision::Send
            }
        }
    }

    /// Release the held-back snapshot, if any.
    pub fn flush(&mut self, now: Instant) -> Option<PoolStatus> {
        let snapshot = self.pending.take()?;
        self.last_sent = Some((now, snapshot.clone()));
        Some(snapshot)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

impl Default for PoolSnapshotGate {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_PUSH_INTERVAL)
    }
}
