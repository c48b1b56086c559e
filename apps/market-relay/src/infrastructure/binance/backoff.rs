//! Reconnection Policy
//!
//! Fixed retry schedule for upstream WebSocket reconnection. Delays step
//! through a short ladder and then hold at the longest rung until a
//! connection succeeds and the schedule is reset.

use std::time::Duration;

/// Retry delays indexed by consecutive-failure count. Failures beyond the
/// last rung keep using the last rung.
pub const RETRY_SCHEDULE: [Duration; 5] = [
    Duration::from_secs(1),
    Duration::from_secs(2),
    Duration::from_secs(5),
    Duration::from_secs(10),
    Duration::from_secs(30),
];

/// Reconnection policy over the fixed schedule.
///
/// The delays are deterministic so reconnect timing stays predictable in
/// logs and tests; there is no jitter.
#[derive(Debug, Default)]
pub struct ReconnectPolicy {
    failures: u32,
}

impl ReconnectPolicy {
    /// Create a policy with no recorded failures.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            failures: 0,
        }
    }

    /// Record a failure and return the delay to wait before the next
    /// connection attempt.
    pub fn next_delay(&mut self) -> Duration {
        let index = (self.failures as usize).min(RETRY_SCHEDULE.len() - 1);
        self.failures = self.failures.saturating_add(1);
        RETRY_SCHEDULE[index]
    }

    /// Reset after a successful connection.
    pub const fn reset(&mut self) {
        self.failures = 0;
    }

    /// Consecutive failures since the last successful connection.
    #[must_use]
    pub const fn failure_count(&self) -> u32 {
        self.failures
    }
}
