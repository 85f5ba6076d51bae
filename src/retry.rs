//! Retry logic with exponential backoff
//!
//! [`RetryPolicy`] is a pure decision function: given an error and the 0-based attempt
//! number it says whether to retry and how long to wait. Rate-limited errors back off
//! from a larger base with wider jitter so that concurrent retries de-synchronize.
//!
//! # Example
//!
//! ```no_run
//! use eth_log_fetcher::retry::{RetryPolicy, retry_with_backoff};
//! use eth_log_fetcher::ProviderError;
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), ProviderError> {
//! let policy = RetryPolicy::new(3, Duration::from_secs(1), Duration::from_secs(30), true);
//! let head = retry_with_backoff(&policy, || async {
//!     // Your operation here
//!     Ok::<u64, ProviderError>(19_000_000)
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

use crate::config::FetcherConfig;
use crate::error::IsRateLimited;
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Floor for the backoff base of rate-limited errors
pub const RATE_LIMIT_MIN_BASE_DELAY: Duration = Duration::from_millis(2000);

/// Relative jitter applied to ordinary failures (±10%)
const JITTER_SPREAD: f64 = 0.1;

/// Relative jitter applied to rate-limited failures (±30%)
const RATE_LIMIT_JITTER_SPREAD: f64 = 0.3;

/// Outcome of consulting a [`RetryPolicy`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryDecision {
    /// Whether another attempt should be made
    pub should_retry: bool,
    /// How long to wait before that attempt (zero when not retrying)
    pub delay: Duration,
    /// Whether the error was classified as rate limiting
    pub rate_limited: bool,
}

/// Exponential backoff policy with optional jitter
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial attempt
    pub max_retries: u32,
    /// Base delay for ordinary failures
    pub initial_delay: Duration,
    /// Cap applied before jitter
    pub max_delay: Duration,
    /// Randomize delays
    pub jitter: bool,
}

impl RetryPolicy {
    /// Create a policy
    #[must_use]
    pub fn new(max_retries: u32, initial_delay: Duration, max_delay: Duration, jitter: bool) -> Self {
        Self {
            max_retries,
            initial_delay,
            max_delay,
            jitter,
        }
    }

    /// Derive the policy from a fetcher configuration
    #[must_use]
    pub fn from_config(config: &FetcherConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_retry_delay,
            config.max_retry_delay,
            config.retry_jitter,
        )
    }

    /// Total attempts a task gets (initial call + retries)
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Decide what to do after `error` on the 0-based `attempt`
    pub fn decide<E>(&self, error: &E, attempt: u32) -> RetryDecision
    where
        E: IsRateLimited + ?Sized,
    {
        let rate_limited = error.is_rate_limited();
        if attempt >= self.max_retries {
            return RetryDecision {
                should_retry: false,
                delay: Duration::ZERO,
                rate_limited,
            };
        }

        let delay = self.backoff_delay(attempt, rate_limited);
        RetryDecision {
            should_retry: true,
            delay: if self.jitter {
                add_jitter(delay, rate_limited)
            } else {
                delay
            },
            rate_limited,
        }
    }

    /// Un-jittered delay before retry number `attempt + 1`
    ///
    /// `min(base * 2^attempt, max_delay)`, where the base is the initial delay, or
    /// `max(2 * initial_delay, 2s)` for rate-limited errors.
    pub fn backoff_delay(&self, attempt: u32, rate_limited: bool) -> Duration {
        let base = if rate_limited {
            self.initial_delay
                .saturating_mul(2)
                .max(RATE_LIMIT_MIN_BASE_DELAY)
        } else {
            self.initial_delay
        };
        base.saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetcherConfig::default())
    }
}

/// Execute an async operation, retrying every failure per `policy`
///
/// Each wait is a `tokio::time::sleep`, so other tasks keep making progress.
///
/// # Returns
///
/// The first successful result, or the last error once `policy.max_retries` retries
/// have been used.
pub async fn retry_with_backoff<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRateLimited + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) => {
                let decision = policy.decide(&e, attempt);
                if !decision.should_retry {
                    tracing::debug!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts exhausted"
                    );
                    return Err(e);
                }

                tracing::debug!(
                    error = %e,
                    attempt = attempt + 1,
                    max_attempts = policy.max_attempts(),
                    delay_ms = decision.delay.as_millis() as u64,
                    rate_limited = decision.rate_limited,
                    "operation failed, retrying"
                );
                tokio::time::sleep(decision.delay).await;
                attempt += 1;
            }
        }
    }
}

/// Scale `delay` by a random factor in `1 ± spread`
///
/// The spread is ±30% for rate-limited errors and ±10% otherwise.
pub fn add_jitter(delay: Duration, rate_limited: bool) -> Duration {
    let spread = if rate_limited {
        RATE_LIMIT_JITTER_SPREAD
    } else {
        JITTER_SPREAD
    };
    let factor: f64 = rand::thread_rng().gen_range(-spread..=spread);
    Duration::try_from_secs_f64(delay.as_secs_f64() * (1.0 + factor)).unwrap_or(Duration::MAX)
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    enum TestError {
        Transient,
        Throttled,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            match self {
                TestError::Transient => write!(f, "connection reset"),
                TestError::Throttled => write!(f, "429 too many requests"),
            }
        }
    }

    impl IsRateLimited for TestError {
        fn is_rate_limited(&self) -> bool {
            self.to_string().as_str().is_rate_limited()
        }
    }

    fn policy(max_retries: u32, initial_ms: u64) -> RetryPolicy {
        RetryPolicy::new(
            max_retries,
            Duration::from_millis(initial_ms),
            Duration::from_secs(60),
            false,
        )
    }

    #[test]
    fn ordinary_backoff_doubles_from_initial_delay() {
        let p = policy(5, 100);
        assert_eq!(p.backoff_delay(0, false), Duration::from_millis(100));
        assert_eq!(p.backoff_delay(1, false), Duration::from_millis(200));
        assert_eq!(p.backoff_delay(3, false), Duration::from_millis(800));
    }

    #[test]
    fn rate_limited_backoff_uses_two_second_floor() {
        let p = policy(5, 100);
        assert_eq!(p.backoff_delay(0, true), Duration::from_secs(2));
        assert_eq!(p.backoff_delay(2, true), Duration::from_secs(8));

        let slow = policy(5, 1500);
        assert_eq!(
            slow.backoff_delay(0, true),
            Duration::from_secs(3),
            "base is twice the initial delay once that exceeds 2s"
        );
    }

    #[test]
    fn backoff_is_capped_at_max_delay() {
        let p = RetryPolicy::new(10, Duration::from_secs(1), Duration::from_secs(3), false);
        assert_eq!(p.backoff_delay(0, false), Duration::from_secs(1));
        assert_eq!(p.backoff_delay(4, false), Duration::from_secs(3));
        assert_eq!(p.backoff_delay(10, true), Duration::from_secs(3));
    }

    #[test]
    fn huge_attempt_numbers_saturate_instead_of_overflowing() {
        let p = RetryPolicy::new(u32::MAX, Duration::from_secs(1), Duration::from_secs(60), false);
        assert_eq!(p.backoff_delay(200, false), Duration::from_secs(60));
    }

    #[test]
    fn jitter_on_unbounded_delay_saturates_instead_of_panicking() {
        for _ in 0..100 {
            let jittered = add_jitter(Duration::MAX, true);
            assert!(jittered >= Duration::from_secs(u64::MAX / 2), "{jittered:?}");
        }

        let p = RetryPolicy::new(10, Duration::from_secs(1), Duration::MAX, true);
        for _ in 0..100 {
            let decision = p.decide(&TestError::Throttled, 9);
            assert!(decision.should_retry);
            assert!(decision.delay >= Duration::from_secs(2 * 512 * 7 / 10));
        }
    }

    #[test]
    fn decide_stops_once_retries_are_used() {
        let p = policy(2, 100);
        assert!(p.decide(&TestError::Transient, 0).should_retry);
        assert!(p.decide(&TestError::Transient, 1).should_retry);

        let last = p.decide(&TestError::Transient, 2);
        assert!(!last.should_retry);
        assert_eq!(last.delay, Duration::ZERO);
    }

    #[test]
    fn decide_flags_rate_limited_errors() {
        let p = policy(2, 100);
        let d = p.decide(&TestError::Throttled, 0);
        assert!(d.rate_limited);
        assert_eq!(d.delay, Duration::from_secs(2));

        let d = p.decide(&TestError::Transient, 0);
        assert!(!d.rate_limited);
        assert_eq!(d.delay, Duration::from_millis(100));
    }

    #[test]
    fn zero_max_retries_never_retries() {
        let p = policy(0, 100);
        assert!(!p.decide(&TestError::Transient, 0).should_retry);
        assert_eq!(p.max_attempts(), 1);
    }

    #[test]
    fn jitter_stays_within_ten_percent_for_ordinary_errors() {
        let delay = Duration::from_millis(1000);
        for i in 0..200 {
            let jittered = add_jitter(delay, false);
            assert!(
                jittered >= Duration::from_millis(899) && jittered <= Duration::from_millis(1101),
                "iteration {i}: {jittered:?} outside ±10%"
            );
        }
    }

    #[test]
    fn jitter_stays_within_thirty_percent_for_rate_limits() {
        let delay = Duration::from_millis(2000);
        for i in 0..200 {
            let jittered = add_jitter(delay, true);
            assert!(
                jittered >= Duration::from_millis(1399) && jittered <= Duration::from_millis(2601),
                "iteration {i}: {jittered:?} outside ±30%"
            );
        }
    }

    #[test]
    fn jitter_on_zero_delay_returns_zero() {
        assert_eq!(add_jitter(Duration::ZERO, true), Duration::ZERO);
    }

    #[tokio::test]
    async fn success_needs_no_retry() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&policy(3, 10), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, TestError>(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "should only call once");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_until_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&policy(2, 100), || {
            let counter = counter_clone.clone();
            async move {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3, "initial + 2 retries");
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_retries_return_last_error() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = retry_with_backoff(&policy(2, 100), || {
            let counter = counter_clone.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<i32, _>(TestError::Transient)
            }
        })
        .await;

        assert!(matches!(result, Err(TestError::Transient)));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_follow_the_exponential_schedule() {
        let start = tokio::time::Instant::now();
        let _ = retry_with_backoff(&policy(3, 100), || async {
            Err::<i32, _>(TestError::Transient)
        })
        .await;

        // 100ms + 200ms + 400ms of virtual time
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(700) && elapsed < Duration::from_millis(710),
            "{elapsed:?}"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limited_failures_wait_longer() {
        let start = tokio::time::Instant::now();
        let _ = retry_with_backoff(&policy(2, 100), || async {
            Err::<i32, _>(TestError::Throttled)
        })
        .await;

        // 2s + 4s of virtual time
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_secs(6) && elapsed < Duration::from_millis(6010),
            "{elapsed:?}"
        );
    }
}
