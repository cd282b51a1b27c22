//! Failure backoff for one domain loop.

use std::time::Duration;

use crate::models::ScheduleConfig;

/// Exponential backoff over consecutive failures.
///
/// The k-th consecutive failure waits `error_backoff * 2^(k-1)`, capped at
/// `max_backoff`. Once `escalate_after_failures` is reached the wait is at
/// least the extended cooldown. A success resets the count.
#[derive(Debug, Clone)]
pub struct Backoff {
    base: u64,
    cap: u64,
    escalate_after: Option<u32>,
    extended: u64,
    failures: u32,
}

impl Backoff {
    pub fn new(schedule: &ScheduleConfig) -> Self {
        Self {
            base: schedule.error_backoff_secs.max(1),
            cap: schedule.max_backoff_secs.max(schedule.error_backoff_secs),
            escalate_after: schedule.escalate_after_failures,
            extended: schedule.extended_cooldown_secs,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn record_success(&mut self) {
        self.failures = 0;
    }

    /// Count a failure and return how long to wait before the next attempt.
    pub fn record_failure(&mut self) -> Duration {
        self.failures = self.failures.saturating_add(1);
        Duration::from_secs(self.delay_for(self.failures))
    }

    fn delay_for(&self, failures: u32) -> u64 {
        let exponent = failures.saturating_sub(1).min(32);
        let delay = self.base.saturating_mul(1u64 << exponent).min(self.cap);

        match self.escalate_after {
            Some(limit) if failures >= limit => delay.max(self.extended),
            _ => delay,
        }
    }
}
