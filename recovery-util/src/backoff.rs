//! The retry/timeout-doubling primitive used by every storage operation in
//! `recovery-core` (spec.md §4.3 "Retries", §7).

use std::time::Duration;

/// Tracks the attempt counter and doubling timeout for a single storage
/// operation (one READ, WRITE, or REMOVE within a [`RecoveryTask`]).
///
/// [`RecoveryTask`]: https://docs.rs/recovery-core (see `recovery_core::task`)
#[derive(Debug, Clone, Copy)]
pub struct RetryBudget {
    attempt: u32,
    max_attempts: u32,
    timeout: Duration,
}

impl RetryBudget {
    /// Start a fresh budget with the given initial per-call timeout and the
    /// maximum number of attempts allowed (`ctx.attempts`).
    pub fn new(initial_timeout: Duration, max_attempts: u32) -> Self {
        RetryBudget {
            attempt: 0,
            max_attempts,
            timeout: initial_timeout,
        }
    }

    /// The timeout to use for the next attempt.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// How many attempts have already been consumed.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether another attempt is permitted after the current one fails.
    pub fn has_retries_left(&self) -> bool {
        self.attempt < self.max_attempts
    }

    /// Record a failed attempt, doubling the timeout for the next one.
    /// Returns `true` if a retry should be attempted, `false` once
    /// `max_attempts` is exhausted.
    #[must_use]
    pub fn record_failure(&mut self) -> bool {
        self.attempt += 1;
        if self.attempt < self.max_attempts {
            self.timeout *= 2;
            true
        } else {
            false
        }
    }
}
