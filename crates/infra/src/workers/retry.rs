//! How often, and how soon, the retrying backend runs a delivery again.
//!
//! Attempts are counted per delivery and include the first run, so
//! `max_attempts = 3` means one run plus two reruns before the delivery is
//! dead-lettered.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// How the wait between attempts grows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// Same wait after every failed attempt.
    Fixed,
    /// Wait doubles with each failed attempt.
    #[default]
    Exponential,
    /// Wait grows by `base_delay` with each failed attempt.
    Linear,
}

/// Attempt budget and backoff for one delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Runs allowed per delivery, the first one included. `1` never reruns.
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// No wait is ever longer than this.
    pub max_delay: Duration,
    pub strategy: BackoffStrategy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 25,
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(3600),
            strategy: BackoffStrategy::Exponential,
        }
    }
}

impl RetryPolicy {
    /// One run; a failure goes straight to the dead letters.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Default::default()
        }
    }

    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay: delay,
            max_delay: delay,
            strategy: BackoffStrategy::Fixed,
        }
    }

    pub fn exponential(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
            strategy: BackoffStrategy::Exponential,
        }
    }

    /// Wait before the next run once run number `attempts` (1-based) failed.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }

        let delay = match self.strategy {
            BackoffStrategy::Fixed => self.base_delay,
            BackoffStrategy::Exponential => {
                self.base_delay.saturating_mul(2u32.saturating_pow(attempts - 1))
            }
            BackoffStrategy::Linear => self.base_delay.saturating_mul(attempts),
        };

        delay.min(self.max_delay)
    }

    /// Is there budget left after `attempts` runs of one delivery?
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}
