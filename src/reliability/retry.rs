use crate::config::serde_helpers::duration_ms;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetryError {
    #[error("Invalid retry configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryStrategy {
    #[default]
    ExponentialBackoff,
    LinearBackoff,
    FixedDelay,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Failed attempts allowed before an event is given up on.
    pub max_retries: u32,
    #[serde(with = "duration_ms", rename = "base_delay_ms")]
    pub base_delay: Duration,
    #[serde(with = "duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    pub strategy: RetryStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            strategy: RetryStrategy::ExponentialBackoff,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), RetryError> {
        if self.max_delay < self.base_delay {
            return Err(RetryError::InvalidConfig(format!(
                "max delay ({:?}) must not be below base delay ({:?})",
                self.max_delay, self.base_delay
            )));
        }
        Ok(())
    }
}

/// Backoff curve shared by every delivery task.
///
/// Delays never decrease from one attempt to the next and never exceed
/// `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempts an event gets. Zero retries still means one attempt.
    pub fn max_attempts(&self) -> u32 {
        self.config.max_retries.max(1)
    }

    pub fn should_give_up(&self, failed_attempts: u32) -> bool {
        failed_attempts >= self.max_attempts()
    }

    /// Delay before the attempt following `failed_attempts` failures.
    pub fn calculate_delay(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1);
        let delay = match self.config.strategy {
            RetryStrategy::ExponentialBackoff => {
                let multiplier = 2_u32.checked_pow(exponent).unwrap_or(u32::MAX);
                self.config.base_delay.saturating_mul(multiplier)
            }
            RetryStrategy::LinearBackoff => {
                self.config.base_delay.saturating_mul(failed_attempts.max(1))
            }
            RetryStrategy::FixedDelay => self.config.base_delay,
        };

        delay.min(self.config.max_delay)
    }
}

/// Retry bookkeeping for one in-flight event.
#[derive(Debug, Clone)]
pub struct DeliveryAttempt<T> {
    pub event: T,
    pub attempt_number: u32,
    pub next_retry_at: Option<Instant>,
}

impl<T> DeliveryAttempt<T> {
    pub fn new(event: T) -> Self {
        Self {
            event,
            attempt_number: 0,
            next_retry_at: None,
        }
    }

    /// Records a failure and returns the delay before the next attempt, or
    /// `None` once the policy gives up.
    pub fn record_failure(&mut self, policy: &RetryPolicy) -> Option<Duration> {
        self.attempt_number += 1;
        if policy.should_give_up(self.attempt_number) {
            self.next_retry_at = None;
            return None;
        }
        let delay = policy.calculate_delay(self.attempt_number);
        self.next_retry_at = Some(Instant::now() + delay);
        Some(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(strategy: RetryStrategy) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_retries: 10,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(1_000),
            strategy,
        })
    }

    #[test]
    fn exponential_doubles_then_caps() {
        let policy = policy(RetryStrategy::ExponentialBackoff);
        assert_eq!(policy.calculate_delay(1), Duration::from_millis(100));
        assert_eq!(policy.calculate_delay(2), Duration::from_millis(200));
        assert_eq!(policy.calculate_delay(3), Duration::from_millis(400));
        assert_eq!(policy.calculate_delay(5), Duration::from_millis(1_000));
        assert_eq!(policy.calculate_delay(200), Duration::from_millis(1_000));
    }

    #[test]
    fn every_strategy_is_monotonic_and_bounded() {
        for strategy in [
            RetryStrategy::ExponentialBackoff,
            RetryStrategy::LinearBackoff,
            RetryStrategy::FixedDelay,
        ] {
            let policy = policy(strategy);
            let mut previous = Duration::ZERO;
            for attempt in 1..64 {
                let delay = policy.calculate_delay(attempt);
                assert!(delay >= previous, "{strategy:?} decreased at {attempt}");
                assert!(delay <= Duration::from_millis(1_000));
                previous = delay;
            }
        }
    }

    #[test]
    fn attempt_numbers_increase_until_exhaustion() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 3,
            ..RetryConfig::default()
        });
        let mut attempt = DeliveryAttempt::new("payload");

        assert!(attempt.record_failure(&policy).is_some());
        assert_eq!(attempt.attempt_number, 1);
        assert!(attempt.next_retry_at.is_some());
        assert!(attempt.record_failure(&policy).is_some());
        assert!(attempt.record_failure(&policy).is_none());
        assert_eq!(attempt.attempt_number, 3);
        assert!(attempt.next_retry_at.is_none());
    }

    #[test]
    fn zero_retries_still_attempts_once() {
        let policy = RetryPolicy::new(RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        });
        assert_eq!(policy.max_attempts(), 1);
        assert!(policy.should_give_up(1));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let config = RetryConfig {
            base_delay: Duration::from_secs(10),
            max_delay: Duration::from_secs(1),
            ..RetryConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
