//! Retry schedule for failed webhook events.

use chrono::Duration;

use crate::domain::foundation::Timestamp;

/// Exponential backoff: `base * 2^retry_count`, capped at `max_delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay_secs: u64,
    pub max_delay_secs: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_secs: u64, max_delay_secs: u64) -> Self {
        Self {
            max_retries,
            base_delay_secs,
            max_delay_secs,
        }
    }

    /// Delay before attempt number `retry_count + 1`.
    pub fn delay_for(&self, retry_count: u32) -> Duration {
        let factor = 1_u64.checked_shl(retry_count.min(32)).unwrap_or(u64::MAX);
        let secs = self
            .base_delay_secs
            .saturating_mul(factor)
            .min(self.max_delay_secs);
        Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX))
    }

    /// When the next attempt is due, or `None` once `retry_count` has used up
    /// the budget.
    pub fn next_attempt(&self, retry_count: u32, now: Timestamp) -> Option<Timestamp> {
        if retry_count >= self.max_retries {
            return None;
        }
        Some(now.plus(self.delay_for(retry_count)))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, 30, 3600)
    }
}
