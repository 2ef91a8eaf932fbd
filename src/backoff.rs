//! # Exponential Backoff
//!
//! Bounded retry with exponential backoff for backend calls that are eventually
//! consistent (IAM policy propagation, API enablement).
//!
//! The default policy grant schedule waits 2s, 4s, 8s, 16s between five attempts.
//!
//! ## Usage
//!
//! ```rust
//! use secrets_provisioner::backoff::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), 2);
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
//! assert_eq!(backoff.next_backoff(), Duration::from_secs(8));
//! ```

use crate::constants::{POLICY_GRANT_BASE_DELAY_MS, POLICY_GRANT_MAX_ATTEMPTS};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff calculator
///
/// Each delay is the previous one multiplied by `multiplier`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    base: Duration,
    current: Duration,
    multiplier: u32,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, multiplier: u32) -> Self {
        Self {
            base,
            current: base,
            multiplier,
        }
    }

    /// Get the next delay and advance the sequence
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = self.current.saturating_mul(self.multiplier);
        result
    }

    /// Reset the backoff to the base delay
    pub fn reset(&mut self) {
        self.current = self.base;
    }
}

/// How many times to try an operation and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub base_delay: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: POLICY_GRANT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(POLICY_GRANT_BASE_DELAY_MS),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            multiplier: 2,
        }
    }

    /// Delays slept between attempts (one fewer than `max_attempts`)
    #[must_use]
    pub fn schedule(&self) -> Vec<Duration> {
        let mut backoff = ExponentialBackoff::new(self.base_delay, self.multiplier);
        (1..self.max_attempts.max(1))
            .map(|_| backoff.next_backoff())
            .collect()
    }

    /// Worst-case time spent sleeping before giving up
    #[must_use]
    pub fn total_wait(&self) -> Duration {
        self.schedule().into_iter().sum()
    }
}

/// An operation that failed on its last permitted attempt
#[derive(Debug)]
pub struct RetryError<E> {
    /// Attempts made, including the failing one
    pub attempts: u32,
    pub last_error: E,
}

impl<E: Display> Display for RetryError<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed after {} attempts: {}", self.attempts, self.last_error)
    }
}

impl<E: std::error::Error + 'static> std::error::Error for RetryError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last_error)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are used up
///
/// The closure receives the 1-based attempt number.
///
/// # Errors
/// `RetryError` carrying the last failure once `max_attempts` is reached.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    operation: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    retry_with_backoff_if(policy, operation_name, operation, |_| true).await
}

/// Like [`retry_with_backoff`], but stops early on errors `should_retry` rejects
///
/// # Errors
/// `RetryError` carrying the first non-retryable failure or the last failure once
/// `max_attempts` is reached.
pub async fn retry_with_backoff_if<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
    should_retry: P,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut backoff = ExponentialBackoff::new(policy.base_delay, policy.multiplier);
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation = operation_name, attempt, "Succeeded after retry");
                }
                return Ok(value);
            }
            Err(e) if attempt < max_attempts && should_retry(&e) => {
                let delay = backoff.next_backoff();
                warn!(
                    operation = operation_name,
                    attempt,
                    max_attempts,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "Attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                return Err(RetryError {
                    attempts: attempt,
                    last_error: e,
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn test_exponential_backoff_sequence() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(2), 2);

        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(4));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(8));

        backoff.reset();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(2));
    }

    #[test]
    fn test_default_policy_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(
            policy.schedule(),
            vec![
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
        assert_eq!(policy.total_wait(), Duration::from_secs(30));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = Instant::now();

        let result: Result<(), RetryError<String>> =
            retry_with_backoff(&policy, "always_fails", |attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("attempt {attempt} failed")) }
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.attempts, 5);
        assert_eq!(err.last_error, "attempt 5 failed");
        assert_eq!(calls.load(Ordering::SeqCst), 5);
        assert!(started.elapsed() >= Duration::from_secs(30));
        assert!(started.elapsed() < Duration::from_secs(31));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_succeeds_on_third_attempt() {
        let policy = RetryPolicy::default();

        let value = retry_with_backoff(&policy, "eventually_succeeds", |attempt| async move {
            if attempt < 3 {
                Err("not yet")
            } else {
                Ok(attempt)
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_stops_on_non_retryable_error() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let err = retry_with_backoff_if(
            &policy,
            "fatal",
            |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err::<(), _>("permission denied") }
            },
            |e| *e != "permission denied",
        )
        .await
        .unwrap_err();

        assert_eq!(err.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
