//! Bounded retry with exponential backoff for transient failures.
//!
//! Only idempotent reads are retried (payment status queries). One-shot
//! operations such as credential refresh or redirect settlement are never
//! wrapped in a retry, since a duplicate attempt could double-process.
//!
//! [`RetryBudget`] counts *consecutive* failures: a successful call resets
//! it, so a long-running poll tolerates occasional blips without ever
//! restarting from scratch.
//!
//! # Example
//!
//! ```rust
//! use slotpay_runtime::retry::{RetryBudget, RetryPolicy};
//! use std::time::Duration;
//!
//! let policy = RetryPolicy::builder()
//!     .max_retries(3)
//!     .initial_delay(Duration::from_millis(500))
//!     .build();
//!
//! let mut budget = RetryBudget::new(policy);
//! assert_eq!(budget.record_failure(), Some(Duration::from_millis(500)));
//! budget.record_success();
//! assert_eq!(budget.consecutive_failures(), 0);
//! ```

use std::time::Duration;

/// Retry policy configuration for exponential backoff.
///
/// # Default Values
///
/// - `max_retries`: 3
/// - `initial_delay`: 500ms
/// - `max_delay`: 10 seconds
/// - `multiplier`: 2.0 (delay doubles each retry)
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: usize,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Maximum delay between retries (cap for exponential backoff)
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new policy builder.
    #[must_use]
    pub const fn builder() -> RetryPolicyBuilder {
        RetryPolicyBuilder {
            max_retries: None,
            initial_delay: None,
            max_delay: None,
            multiplier: None,
        }
    }

    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Whether retry number `attempt` (1-based) is still within budget.
    #[must_use]
    pub const fn should_retry(&self, attempt: usize) -> bool {
        attempt <= self.max_retries
    }

    /// Calculate delay for a given attempt number (0-based).
    ///
    /// Uses exponential backoff: `initial_delay * multiplier^attempt`, capped
    /// at `max_delay`.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return self.initial_delay.min(self.max_delay);
        }

        let exponent = attempt.min(i32::MAX as usize) as i32;
        let delay_ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent);

        if !delay_ms.is_finite() || delay_ms >= self.max_delay.as_millis() as f64 {
            self.max_delay
        } else {
            Duration::from_millis(delay_ms as u64)
        }
    }
}

/// Builder for [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryPolicyBuilder {
    max_retries: Option<usize>,
    initial_delay: Option<Duration>,
    max_delay: Option<Duration>,
    multiplier: Option<f64>,
}

impl RetryPolicyBuilder {
    /// Set maximum number of retries.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Set initial delay before first retry.
    #[must_use]
    pub const fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    /// Set maximum delay (cap for exponential backoff).
    #[must_use]
    pub const fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = Some(delay);
        self
    }

    /// Set multiplier for exponential backoff.
    #[must_use]
    pub const fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = Some(multiplier);
        self
    }

    /// Build the [`RetryPolicy`].
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        let defaults = RetryPolicy::default();
        RetryPolicy {
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            initial_delay: self.initial_delay.unwrap_or(defaults.initial_delay),
            max_delay: self.max_delay.unwrap_or(defaults.max_delay),
            multiplier: self.multiplier.unwrap_or(defaults.multiplier),
        }
    }
}

/// Consecutive-failure counter driven by a [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryBudget {
    policy: RetryPolicy,
    consecutive_failures: usize,
}

impl RetryBudget {
    /// Create a fresh budget.
    #[must_use]
    pub const fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive_failures: 0,
        }
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before retrying, or `None` once the policy's
    /// retries are exhausted.
    pub fn record_failure(&mut self) -> Option<Duration> {
        self.consecutive_failures += 1;
        if self.policy.should_retry(self.consecutive_failures) {
            Some(self.policy.delay_for_attempt(self.consecutive_failures - 1))
        } else {
            None
        }
    }

    /// Record a successful attempt, resetting the failure streak.
    pub fn record_success(&mut self) {
        if self.consecutive_failures > 0 {
            tracing::debug!(
                failures = self.consecutive_failures,
                "Recovered after transient failures"
            );
        }
        self.consecutive_failures = 0;
    }

    /// Failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> usize {
        self.consecutive_failures
    }

    /// Whether the budget has no retries left.
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        !self.policy.should_retry(self.consecutive_failures)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_doubles_until_capped() {
        let policy = RetryPolicy::builder()
            .initial_delay(Duration::from_millis(100))
            .multiplier(2.0)
            .max_delay(Duration::from_millis(500))
            .build();

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(60), Duration::from_millis(500));
    }

    #[test]
    fn budget_exhausts_after_max_retries() {
        let mut budget = RetryBudget::new(RetryPolicy::builder().max_retries(2).build());

        assert!(budget.record_failure().is_some());
        assert!(budget.record_failure().is_some());
        assert!(budget.record_failure().is_none());
        assert!(budget.is_exhausted());
        assert_eq!(budget.consecutive_failures(), 3);
    }

    #[test]
    fn success_resets_streak() {
        let mut budget = RetryBudget::new(RetryPolicy::builder().max_retries(1).build());

        assert!(budget.record_failure().is_some());
        budget.record_success();
        assert!(budget.record_failure().is_some());
        assert!(!budget.is_exhausted());
    }

    #[test]
    fn none_policy_never_retries() {
        let mut budget = RetryBudget::new(RetryPolicy::none());
        assert!(budget.record_failure().is_none());
    }
}
