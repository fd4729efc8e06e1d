//! Bounded exponential backoff for AWS calls
//!
//! SDK-level retries are disabled (see [`super::client`]) so this policy is
//! the only one in effect and its attempt budget is exact.

use super::error::FetchError;
use std::future::Future;
use std::time::Duration;

/// Retry policy for transient AWS errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Policy that retries without sleeping (tests and fakes)
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails permanently, or the budget runs out
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op().await {
                Err(err) if err.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for_attempt(attempt);
                    tracing::debug!(
                        "attempt {}/{} failed ({}), retrying in {:?}",
                        attempt,
                        self.max_attempts,
                        err,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                result => return result,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(2),
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_secs(2));
    }

    #[test]
    fn test_retries_throttling_until_budget_exhausted() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result: Result<(), FetchError> = tokio_test::block_on(policy.run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Throttled("rate".into())) }
        }));

        assert!(matches!(result, Err(FetchError::Throttled(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result = tokio_test::block_on(policy.run(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(FetchError::Timeout("slow".into()))
                } else {
                    Ok(n)
                }
            }
        }));

        assert_eq!(result, Ok(1));
    }

    #[test]
    fn test_does_not_retry_auth_errors() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::immediate(3);

        let result: Result<(), FetchError> = tokio_test::block_on(policy.run(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(FetchError::Unauthorized("denied".into())) }
        }));

        assert!(matches!(result, Err(FetchError::Unauthorized(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_zero_attempts_still_runs_once() {
        assert_eq!(RetryPolicy::new(0).max_attempts, 1);
    }
}
