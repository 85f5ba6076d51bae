//! Provider decorator with per-call retries

use super::LogProvider;
use crate::config::FetcherConfig;
use crate::error::{IsRateLimited, ProviderError};
use crate::range::BlockRange;
use crate::retry::{RetryPolicy, retry_with_backoff};
use crate::types::{Log, LogFilter};
use async_trait::async_trait;
use std::future::Future;

/// Wraps a [`LogProvider`] so every call is retried with exponential backoff
///
/// When retries run out the last error is replaced by
/// [`ProviderError::RateLimited`] if it looked like throttling, or
/// [`ProviderError::RetriesExhausted`] otherwise.
///
/// Chunk fetches are already retried by the executor; wrapping the provider as well
/// multiplies the attempts per chunk.
#[derive(Debug)]
pub struct RetryingProvider<P> {
    inner: P,
    policy: RetryPolicy,
}

impl<P> RetryingProvider<P> {
    /// Wrap `inner` with `policy`
    pub fn new(inner: P, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrap `inner` using the retry settings of `config`
    pub fn from_config(inner: P, config: &FetcherConfig) -> Self {
        Self::new(inner, RetryPolicy::from_config(config))
    }

    /// Same provider with a different policy
    #[must_use]
    pub fn with_policy(self, policy: RetryPolicy) -> Self {
        Self {
            inner: self.inner,
            policy,
        }
    }

    /// The wrapped provider
    pub fn inner(&self) -> &P {
        &self.inner
    }

    /// Policy applied to every call
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    async fn call<T, F, Fut>(&self, method: &str, operation: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        retry_with_backoff(&self.policy, operation)
            .await
            .map_err(|last| {
                let attempts = self.policy.max_attempts();
                let message = last.to_string();
                tracing::warn!(method, attempts, error = %message, "provider call failed");
                if last.is_rate_limited() {
                    ProviderError::RateLimited { attempts, message }
                } else {
                    ProviderError::RetriesExhausted { attempts, message }
                }
            })
    }
}

#[async_trait]
impl<P> LogProvider for RetryingProvider<P>
where
    P: LogProvider,
{
    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, ProviderError> {
        self.call("eth_getLogs", || self.inner.get_logs(range, filter))
            .await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.call("eth_blockNumber", || self.inner.block_number())
            .await
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails with the scripted errors first, then answers with `head`
    struct FlakyProvider {
        failures: Mutex<Vec<ProviderError>>,
        calls: AtomicU32,
        head: u64,
    }

    impl FlakyProvider {
        fn new(failures: Vec<ProviderError>) -> Self {
            Self {
                failures: Mutex::new(failures),
                calls: AtomicU32::new(0),
                head: 1_000,
            }
        }

        fn next(&self) -> Result<(), ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut failures = self.failures.lock().unwrap();
            if failures.is_empty() {
                Ok(())
            } else {
                Err(failures.remove(0))
            }
        }
    }

    #[async_trait]
    impl LogProvider for FlakyProvider {
        async fn get_logs(
            &self,
            _range: BlockRange,
            _filter: &LogFilter,
        ) -> Result<Vec<Log>, ProviderError> {
            self.next().map(|()| Vec::new())
        }

        async fn block_number(&self) -> Result<u64, ProviderError> {
            self.next().map(|()| self.head)
        }
    }

    fn policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(100), Duration::from_secs(30), true)
    }

    fn transient() -> ProviderError {
        ProviderError::Other("connection reset".to_string())
    }

    fn throttled() -> ProviderError {
        ProviderError::Http {
            status: 429,
            body: "Too Many Requests".to_string(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn recovers_from_transient_failures() {
        let provider = RetryingProvider::new(
            FlakyProvider::new(vec![transient(), transient()]),
            policy(3),
        );

        assert_eq!(provider.block_number().await.unwrap(), 1_000);
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_attempt_count() {
        let provider = RetryingProvider::new(
            FlakyProvider::new(vec![transient(), transient(), transient()]),
            policy(2),
        );

        let err = provider
            .get_logs(BlockRange::new(0, 99).unwrap(), &LogFilter::new())
            .await
            .unwrap_err();

        match err {
            ProviderError::RetriesExhausted { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("connection reset"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn throttled_exhaustion_becomes_rate_limited() {
        let provider = RetryingProvider::new(
            FlakyProvider::new(vec![throttled(), throttled()]),
            policy(1),
        );

        let err = provider.block_number().await.unwrap_err();
        assert!(matches!(err, ProviderError::RateLimited { attempts: 2, .. }), "{err:?}");
        assert!(err.is_rate_limited());
    }

    #[tokio::test]
    async fn zero_retries_calls_once() {
        let provider = RetryingProvider::new(FlakyProvider::new(vec![transient()]), policy(0));
        assert!(provider.block_number().await.is_err());
        assert_eq!(provider.inner().calls.load(Ordering::SeqCst), 1);
    }
}
