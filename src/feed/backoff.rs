//! Reconnect backoff schedule

use std::time::Duration;

/// Exponential backoff with a ceiling on consecutive failures.
///
/// `attempt` counts consecutive failed connection attempts, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
    /// Consecutive failures after which retrying stops (0 = never stop)
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max: Duration::from_secs(30),
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Delay before retrying after `attempt` consecutive failures, or `None`
    /// once the ceiling has been reached
    pub fn delay_for(&self, attempt: u32) -> Option<Duration> {
        if self.is_exhausted(attempt) {
            return None;
        }
        let exponent = attempt.saturating_sub(1).min(31);
        Some(self.base.saturating_mul(1u32 << exponent).min(self.max))
    }

    pub fn is_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }
}
