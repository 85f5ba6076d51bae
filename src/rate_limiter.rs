//! Request pacing using a token bucket
//!
//! [`RequestLimiter`] caps how many provider requests are issued per second across all
//! concurrently running chunk fetches. It is independent of the adaptive concurrency
//! limit: the governor bounds how many requests are in flight, the limiter bounds how
//! often new ones start.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Shared request-rate limiter
///
/// # Algorithm
///
/// - One token is one request
/// - Tokens refill continuously at `limit` per second, up to a burst of `limit`
/// - [`RequestLimiter::acquire`] takes a token, sleeping until one is available
///
/// Clones share the same bucket.
#[derive(Clone, Debug)]
pub struct RequestLimiter {
    /// Requests per second (0 = unlimited)
    limit_rps: Arc<AtomicU64>,
    /// Available tokens
    tokens: Arc<AtomicU64>,
    /// Time covered by refills so far, in nanoseconds since `origin`
    last_refill: Arc<AtomicU64>,
    origin: Instant,
}

impl RequestLimiter {
    /// Create a limiter allowing `limit_rps` requests per second (None = unlimited)
    ///
    /// # Examples
    ///
    /// ```
    /// use eth_log_fetcher::rate_limiter::RequestLimiter;
    ///
    /// let limiter = RequestLimiter::new(Some(25));
    /// assert_eq!(limiter.limit(), Some(25));
    ///
    /// let unlimited = RequestLimiter::new(None);
    /// assert_eq!(unlimited.limit(), None);
    /// ```
    #[must_use]
    pub fn new(limit_rps: Option<u32>) -> Self {
        let limit = u64::from(limit_rps.unwrap_or(0));
        Self {
            limit_rps: Arc::new(AtomicU64::new(limit)),
            tokens: Arc::new(AtomicU64::new(limit)),
            last_refill: Arc::new(AtomicU64::new(0)),
            origin: Instant::now(),
        }
    }

    /// Change the limit; raising it adds the difference to the bucket immediately
    pub fn set_limit(&self, limit_rps: Option<u32>) {
        let new_limit = u64::from(limit_rps.unwrap_or(0));
        let old_limit = self.limit_rps.swap(new_limit, Ordering::SeqCst);

        if new_limit > old_limit {
            self.tokens
                .fetch_add(new_limit - old_limit, Ordering::SeqCst);
        }
    }

    /// Current limit, or None if unlimited
    pub fn limit(&self) -> Option<u32> {
        let limit = self.limit_rps.load(Ordering::Relaxed);
        if limit == 0 {
            None
        } else {
            u32::try_from(limit).ok()
        }
    }

    /// Wait for permission to issue one request
    pub async fn acquire(&self) {
        loop {
            // Re-read each iteration so limit changes apply to waiters
            let limit = self.limit_rps.load(Ordering::Relaxed);
            if limit == 0 {
                return;
            }

            self.refill_tokens();

            let current = self.tokens.load(Ordering::SeqCst);
            if current > 0 {
                if self
                    .tokens
                    .compare_exchange(current, current - 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
                {
                    return;
                }
                continue;
            }

            // Roughly one token interval, re-checked at least every 100ms
            let wait_ms = (1000 / limit).clamp(1, 100);
            tokio::time::sleep(Duration::from_millis(wait_ms)).await;
        }
    }

    fn refill_tokens(&self) {
        let limit = self.limit_rps.load(Ordering::Relaxed);
        if limit == 0 {
            return;
        }

        let now = self.now_nanos();
        let last = self.last_refill.load(Ordering::SeqCst);
        let elapsed = u128::from(now.saturating_sub(last));

        let to_add = elapsed * u128::from(limit) / NANOS_PER_SEC;
        if to_add == 0 {
            return;
        }

        // Advance only by the time the whole tokens account for, keeping the remainder
        let consumed = to_add * NANOS_PER_SEC / u128::from(limit);
        let next = last.saturating_add(u64::try_from(consumed).unwrap_or(u64::MAX));
        if self
            .last_refill
            .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let add = u64::try_from(to_add).unwrap_or(u64::MAX);
            let _ = self
                .tokens
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |tokens| {
                    Some(tokens.saturating_add(add).min(limit))
                });
        }
    }

    fn now_nanos(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}
