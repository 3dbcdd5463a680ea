//! Retry policy with capped exponential backoff.

use std::time::Duration;

/// Default first retry delay (1 second).
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Default backoff cap (60 seconds).
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(60);

/// Default growth factor between attempts.
pub const DEFAULT_BACKOFF_FACTOR: u32 = 2;

/// Default number of delivery attempts before dead-lettering.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// How often and how far apart a record is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts allowed before the record is dead-lettered (at least 1).
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base: Duration,
    /// Multiplier applied per further failure.
    pub factor: u32,
    /// Upper bound for any single delay.
    pub cap: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base: DEFAULT_BACKOFF_BASE,
            factor: DEFAULT_BACKOFF_FACTOR,
            cap: DEFAULT_BACKOFF_CAP,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base,
            factor: DEFAULT_BACKOFF_FACTOR,
            cap: cap.max(base),
        }
    }

    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor.max(1);
        self
    }

    /// Delay before the next attempt after `attempts` failures.
    ///
    /// `backoff(1) == base`, then multiplied by `factor` per failure and
    /// capped at `cap`. Zero failures means no delay.
    pub fn backoff(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let exp = attempts - 1;
        let multiplier = self.factor.checked_pow(exp).unwrap_or(u32::MAX);
        self.base
            .checked_mul(multiplier)
            .map_or(self.cap, |d| d.min(self.cap))
    }

    /// Whether a record with `attempts` failures has used up its budget.
    pub fn is_exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Total time spent waiting between attempts for a record that fails
    /// every one of its `max_attempts` attempts.
    pub fn total_retry_delay(&self) -> Duration {
        (1..self.max_attempts).map(|n| self.backoff(n)).sum()
    }
}
