//! Circuit Breaker pattern implementation.
//!
//! Refuses to replace a snapshot when a fetch comes back empty or much
//! smaller than the previous one; a half-broken source would otherwise
//! wipe the snapshot and turn everything into "new" on the next good poll.
//!
//! A drop that keeps repeating is a real shrink (campaigns expiring, say):
//! after `accept_after_trips` consecutive trips the smaller list becomes the
//! new baseline. Empty fetches are never accepted.

use crate::error::{AppError, Result};
use crate::models::{Domain, SnapshotGuardConfig};

/// Circuit breaker for preventing bad snapshot updates.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    config: SnapshotGuardConfig,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to proceed with the write
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// Previous snapshot empty or below baseline
    ColdStart { current_count: usize },
    /// Drop above threshold - abort
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Nothing fetched while the snapshot is non-empty
    EmptyResult,
}

impl CircuitBreaker {
    pub fn new(config: SnapshotGuardConfig) -> Self {
        Self { config }
    }

    /// Classify a fetch of `current_count` records against a snapshot of
    /// `previous_count`.
    pub fn check(&self, current_count: usize, previous_count: usize) -> CircuitBreakerResult {
        if current_count == 0 {
            if previous_count == 0 {
                return CircuitBreakerResult::ColdStart { current_count };
            }
            return CircuitBreakerResult::EmptyResult;
        }

        if previous_count < self.config.min_baseline {
            return CircuitBreakerResult::ColdStart { current_count };
        }

        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;

            if drop_percent > self.config.max_drop_percent as f64 {
                return CircuitBreakerResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Validate and return Ok if safe, Err if circuit breaker triggered.
    ///
    /// `prior_trips` is the number of consecutive drops already refused for
    /// this domain.
    pub fn validate(
        &self,
        domain: Domain,
        current_count: usize,
        previous_count: usize,
        prior_trips: u32,
    ) -> Result<()> {
        match self.check(current_count, previous_count) {
            CircuitBreakerResult::Safe { .. } => Ok(()),
            CircuitBreakerResult::ColdStart { current_count } => {
                log::debug!(
                    "Circuit breaker ({}): cold start with {} records",
                    domain,
                    current_count
                );
                Ok(())
            }
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } if self.accepts_after(prior_trips) => {
                log::warn!(
                    "Circuit breaker ({}): {} → {} records ({:.1}% drop) seen {} times in a row; accepting as new baseline",
                    domain,
                    previous_count,
                    current_count,
                    drop_percent,
                    prior_trips + 1
                );
                Ok(())
            }
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Circuit breaker ({}): TRIGGERED! {} → {} records ({:.1}% drop > {}% threshold)",
                    domain,
                    previous_count,
                    current_count,
                    drop_percent,
                    self.config.max_drop_percent
                );
                Err(AppError::CircuitBreakerTriggered {
                    current_count,
                    previous_count,
                    drop_percent,
                    threshold_percent: self.config.max_drop_percent,
                })
            }
            CircuitBreakerResult::EmptyResult => {
                log::error!(
                    "Circuit breaker ({}): empty fetch over {} stored records",
                    domain,
                    previous_count
                );
                Err(AppError::EmptyFetchResult)
            }
        }
    }
}

impl CircuitBreaker {
    fn accepts_after(&self, prior_trips: u32) -> bool {
        let limit = self.config.accept_after_trips;
        limit > 0 && prior_trips + 1 >= limit
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(SnapshotGuardConfig::default())
    }
}
