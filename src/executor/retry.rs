//! Bounded retry with exponential backoff for transient component failures

use crate::component::ComponentError;
use crate::config::RetryConfig;
use std::time::Duration;

/// Retry policy derived from [`RetryConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl RetryPolicy {
    /// Policy with explicit bounds.
    #[must_use]
    pub const fn new(max_retries: u32, base_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            base_backoff,
            max_backoff,
        }
    }

    /// Policy that never retries.
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO)
    }

    /// Retries after the first attempt.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Upper bound on attempts for one stage.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Whether a failure on attempt `attempt` (1-based) should be retried.
    #[must_use]
    pub fn should_retry(&self, err: &ComponentError, attempt: u32) -> bool {
        err.is_transient() && attempt <= self.max_retries
    }

    /// Delay before the retry that follows attempt `attempt` (1-based).
    ///
    /// A component's `retry_after` hint wins over the exponential schedule;
    /// both are capped at the maximum backoff.
    #[must_use]
    pub fn backoff(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        if let Some(hint) = retry_after {
            return hint.min(self.max_backoff);
        }
        let base_ms = u64::try_from(self.base_backoff.as_millis()).unwrap_or(u64::MAX);
        let factor = 2u64
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u64::MAX);
        Duration::from_millis(base_ms.saturating_mul(factor)).min(self.max_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            Duration::from_millis(config.base_backoff_ms),
            Duration::from_millis(config.max_backoff_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy::new(3, Duration::from_millis(100), Duration::from_millis(1000))
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let p = policy();
        assert_eq!(p.backoff(1, None), Duration::from_millis(100));
        assert_eq!(p.backoff(2, None), Duration::from_millis(200));
        assert_eq!(p.backoff(3, None), Duration::from_millis(400));
        assert_eq!(p.backoff(5, None), Duration::from_millis(1000));
        assert_eq!(p.backoff(200, None), Duration::from_millis(1000));
    }

    #[test]
    fn test_backoff_respects_retry_after() {
        let p = policy();
        assert_eq!(
            p.backoff(1, Some(Duration::from_millis(750))),
            Duration::from_millis(750)
        );
        assert_eq!(
            p.backoff(1, Some(Duration::from_secs(60))),
            Duration::from_millis(1000)
        );
    }

    #[test]
    fn test_only_transient_failures_retry() {
        let p = policy();
        assert!(p.should_retry(&ComponentError::transient("timeout"), 1));
        assert!(p.should_retry(&ComponentError::transient("timeout"), 3));
        assert!(!p.should_retry(&ComponentError::transient("timeout"), 4));
        assert!(!p.should_retry(&ComponentError::fatal("bad params"), 1));
        assert_eq!(p.max_attempts(), 4);
    }

    #[test]
    fn test_from_config() {
        let p = RetryPolicy::from(&RetryConfig::default());
        assert_eq!(p.max_retries(), 3);
        assert_eq!(p.backoff(1, None), Duration::from_millis(500));
        assert!(!RetryPolicy::none().should_retry(&ComponentError::transient("x"), 1));
    }
}
