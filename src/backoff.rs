// SPDX-License-Identifier: MPL-2.0

//! Reconnect delay policy.
//!
//! A failed connection is retried after a delay rather than immediately, so
//! a recovering broker is not hammered by the whole fleet at once. The delay
//! is either fixed or grows exponentially up to a cap; both are floored to
//! keep a misconfigured policy from busy-looping.

use std::time::Duration;

use thiserror::Error;

/// Delays never drop below this, whatever the policy says.
pub const MIN_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum BackoffError {
    #[error("maximum number of attempts exceeded: {0}")]
    Exhausted(u32),
}

/// How the delay between attempts evolves.
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffPolicy {
    /// The same delay before every attempt.
    Fixed(Duration),
    /// `initial * multiplier^n`, capped at `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(60),
            multiplier: 2.0,
        }
    }
}

/// Tracks attempts against a [`BackoffPolicy`] and an optional hard limit.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    attempt: u32,
    max_attempts: Option<u32>,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy, max_attempts: Option<u32>) -> Self {
        let current = Self::initial_delay(&policy);
        Backoff {
            policy,
            current,
            attempt: 0,
            max_attempts,
        }
    }

    fn initial_delay(policy: &BackoffPolicy) -> Duration {
        let d = match policy {
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { initial, .. } => *initial,
        };
        d.max(MIN_DELAY)
    }

    /// The delay to wait before the next attempt, advancing the schedule.
    pub fn next_delay(&mut self) -> Result<Duration, BackoffError> {
        self.attempt += 1;
        if let Some(max) = self.max_attempts {
            if self.attempt > max {
                return Err(BackoffError::Exhausted(max));
            }
        }

        let delay = self.current;
        if let BackoffPolicy::Exponential {
            max, multiplier, ..
        } = &self.policy
        {
            let next = Duration::from_secs_f64(self.current.as_secs_f64() * multiplier);
            self.current = next.min(*max).max(MIN_DELAY);
        }
        Ok(delay)
    }

    /// Restart the schedule after a successful connection.
    pub fn reset(&mut self) {
        self.current = Self::initial_delay(&self.policy);
        self.attempt = 0;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }
}
