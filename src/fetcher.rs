//! Chunked log fetching
//!
//! [`ChunkFetcher`] turns one sub-range into one provider call and applies the
//! truncation check. [`LogFetcher`] is the public entry point: it partitions the
//! requested range, runs the chunks through a [`ParallelExecutor`] and concatenates
//! the results in block order.

use crate::config::{FetchOptions, FetcherConfig};
use crate::error::{Error, FilterContext, Result};
use crate::executor::{ChunkFailure, ParallelExecutor};
use crate::progress::{ProgressTracker, ProgressUpdate};
use crate::provider::LogProvider;
use crate::range::{BlockRange, BlockTag, partition};
use crate::rate_limiter::RequestLimiter;
use crate::task::FetchTask;
use crate::types::{Log, LogFilter};
use std::sync::Arc;
use std::time::Duration;

/// How often the progress tracker may emit a line
const PROGRESS_INTERVAL: Duration = Duration::from_secs(5);

/// Logs returned for one chunk
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkLogs {
    /// Records in provider order
    pub logs: Vec<Log>,
    /// The chunk they were fetched for
    pub range: BlockRange,
}

/// Fetches a single chunk and validates the response size
pub struct ChunkFetcher<P: ?Sized> {
    provider: Arc<P>,
    filter: LogFilter,
    context: Option<FilterContext>,
    max_logs_per_chunk: usize,
    limiter: Option<RequestLimiter>,
}

impl<P> ChunkFetcher<P>
where
    P: LogProvider + ?Sized + 'static,
{
    /// Create a chunk fetcher for `filter`
    pub fn new(provider: Arc<P>, filter: LogFilter, max_logs_per_chunk: usize) -> Self {
        let context = filter.context();
        Self {
            provider,
            filter,
            context,
            max_logs_per_chunk,
            limiter: None,
        }
    }

    /// Pace provider calls through `limiter`
    #[must_use]
    pub fn with_limiter(mut self, limiter: Option<RequestLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    /// Fetch logs for exactly `range`
    ///
    /// # Errors
    ///
    /// - [`Error::Fetch`] if the provider call fails, with the filter's address/event
    ///   context and the provider error as source
    /// - [`Error::Truncated`] if the provider returned `max_logs_per_chunk` or more
    ///   records
    pub async fn fetch(&self, range: BlockRange) -> Result<ChunkLogs> {
        if let Some(limiter) = &self.limiter {
            limiter.acquire().await;
        }

        let logs = self
            .provider
            .get_logs(range, &self.filter)
            .await
            .map_err(|source| Error::Fetch {
                range,
                context: self.context.clone(),
                source,
            })?;

        if logs.len() >= self.max_logs_per_chunk {
            return Err(Error::Truncated {
                range,
                count: logs.len(),
                limit: self.max_logs_per_chunk,
            });
        }

        tracing::trace!(%range, count = logs.len(), "chunk fetched");
        Ok(ChunkLogs { logs, range })
    }

    /// Build an executor task that fetches `range`
    pub fn task(self: &Arc<Self>, index: usize, range: BlockRange) -> FetchTask<ChunkLogs> {
        let fetcher = Arc::clone(self);
        FetchTask::new(index, range, move || {
            let fetcher = Arc::clone(&fetcher);
            async move { fetcher.fetch(range).await }
        })
    }
}

/// Outcome of a fetch that may have skipped failed chunks
#[derive(Debug)]
pub struct FetchReport {
    /// Logs of every successful chunk, in block order
    pub logs: Vec<Log>,
    /// Chunks that failed terminally (only populated with `continue_on_error`)
    pub failed_chunks: Vec<ChunkFailure>,
    /// Number of chunks the range was split into
    pub total_chunks: usize,
}

impl FetchReport {
    /// Whether every chunk was fetched
    pub fn is_complete(&self) -> bool {
        self.failed_chunks.is_empty()
    }
}

/// Parallel, retrying log fetcher over a [`LogProvider`]
///
/// # Example
///
/// ```no_run
/// use eth_log_fetcher::{FetchOptions, FetcherConfig, HttpProvider, LogFetcher, LogFilter};
///
/// # async fn example() -> eth_log_fetcher::Result<()> {
/// let provider = HttpProvider::new("https://eth.example.com")?;
/// let fetcher = LogFetcher::new(provider, FetcherConfig::default())?;
///
/// let filter = LogFilter::new()
///     .address("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
///     .topic("0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef")
///     .event_name("Transfer");
///
/// let logs = fetcher
///     .fetch_range(18_000_000, 18_100_000, &filter, FetchOptions::default())
///     .await?;
/// println!("fetched {} logs", logs.len());
/// # Ok(())
/// # }
/// ```
pub struct LogFetcher<P: ?Sized> {
    provider: Arc<P>,
    config: FetcherConfig,
    limiter: Option<RequestLimiter>,
}

impl<P> LogFetcher<P>
where
    P: LogProvider + 'static,
{
    /// Create a fetcher that owns `provider`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    pub fn new(provider: P, config: FetcherConfig) -> Result<Self> {
        Self::from_shared(Arc::new(provider), config)
    }
}

impl<P> LogFetcher<P>
where
    P: LogProvider + ?Sized + 'static,
{
    /// Create a fetcher over a shared provider
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails validation.
    pub fn from_shared(provider: Arc<P>, config: FetcherConfig) -> Result<Self> {
        config.validate()?;
        let limiter = config
            .rate_limit_per_second
            .map(|rps| RequestLimiter::new(Some(rps)));
        Ok(Self {
            provider,
            config,
            limiter,
        })
    }

    /// Current configuration
    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// The underlying provider
    pub fn provider(&self) -> &Arc<P> {
        &self.provider
    }

    /// Merge `overrides` into the configuration
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] and leaves the configuration unchanged if the merged
    /// result is invalid.
    pub fn update_config(&mut self, overrides: FetchOptions) -> Result<()> {
        let config = self.config.merged(overrides)?;
        if config.rate_limit_per_second != self.config.rate_limit_per_second {
            self.limiter = config
                .rate_limit_per_second
                .map(|rps| RequestLimiter::new(Some(rps)));
        }
        self.config = config;
        Ok(())
    }

    /// Fetch all logs matching `filter` in the inclusive range `from..=to`
    ///
    /// The filter's own block bounds are ignored. Logs are returned in chunk order.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if `options` make the configuration invalid
    /// - [`Error::BlockRange`] if `from > to`
    /// - [`Error::Execution`] if `continue_on_error` is off and a chunk fails terminally
    pub async fn fetch_range(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
        options: FetchOptions,
    ) -> Result<Vec<Log>> {
        self.fetch_range_with_report(from, to, filter, options)
            .await
            .map(|report| report.logs)
    }

    /// Like [`LogFetcher::fetch_range`], also reporting which chunks failed
    ///
    /// # Errors
    ///
    /// See [`LogFetcher::fetch_range`].
    pub async fn fetch_range_with_report(
        &self,
        from: u64,
        to: u64,
        filter: &LogFilter,
        options: FetchOptions,
    ) -> Result<FetchReport> {
        let per_call_rate = options.rate_limit_per_second;
        let config = self.config.merged(options)?;
        let chunks = partition(from, to, config.chunk_size)?;
        let overall = BlockRange::new(from, to)?;
        let total = chunks.len();

        let label = match &filter.event_name {
            Some(name) => format!("Fetching {name} events"),
            None => "Fetching logs".to_string(),
        };
        if config.show_progress {
            tracing::info!(
                from,
                to,
                chunks = total,
                concurrency = config.concurrency,
                "{label}"
            );
        }

        let limiter = match per_call_rate {
            Some(rps) => Some(RequestLimiter::new(Some(rps))),
            None => self.limiter.clone(),
        };
        let chunk_fetcher = Arc::new(
            ChunkFetcher::new(
                Arc::clone(&self.provider),
                filter.clone(),
                config.max_logs_per_chunk,
            )
            .with_limiter(limiter),
        );
        let tasks = chunks
            .iter()
            .enumerate()
            .map(|(index, range)| chunk_fetcher.task(index, *range))
            .collect();

        let tracker = config
            .show_progress
            .then(|| Arc::new(ProgressTracker::new(total, label.clone(), PROGRESS_INTERVAL)));
        let hook_tracker = tracker.clone();
        let callback = config.progress_callback.clone();

        let executor =
            ParallelExecutor::from_config(&config).with_progress(move |completed, total| {
                if let Some(tracker) = &hook_tracker {
                    tracker.set_completed(completed);
                }
                if let Some(callback) = &callback {
                    callback.call(ProgressUpdate {
                        completed,
                        total,
                        range: overall,
                    });
                }
            });

        let report = executor.execute_with_report(tasks).await?;
        let succeeded = report.results.len();
        let logs: Vec<Log> = report
            .results
            .into_iter()
            .flat_map(|chunk| chunk.logs)
            .collect();

        if let Some(tracker) = tracker {
            tracker.complete();
            tracing::info!(
                logs = logs.len(),
                chunks = succeeded,
                failed = report.failures.len(),
                "{label}: done"
            );
        }

        Ok(FetchReport {
            logs,
            failed_chunks: report.failures,
            total_chunks: total,
        })
    }

    /// Fetch logs using the filter's own block bounds
    ///
    /// Missing bounds default to `earliest` and `latest`; `latest` is resolved with
    /// one `eth_blockNumber` call before any log is requested.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedBlockTag`] for `pending`
    /// - [`Error::Provider`] if the head block cannot be resolved
    /// - [`Error::BlockRange`] if the resolved start is after the resolved end
    /// - everything [`LogFetcher::fetch_range`] can return
    pub async fn fetch_logs(&self, filter: &LogFilter, options: FetchOptions) -> Result<Vec<Log>> {
        self.fetch_logs_with_report(filter, options)
            .await
            .map(|report| report.logs)
    }

    /// Like [`LogFetcher::fetch_logs`], also reporting which chunks failed
    ///
    /// # Errors
    ///
    /// See [`LogFetcher::fetch_logs`].
    pub async fn fetch_logs_with_report(
        &self,
        filter: &LogFilter,
        options: FetchOptions,
    ) -> Result<FetchReport> {
        let (from, to) = self.resolve_bounds(filter).await?;
        if from > to {
            return Err(Error::BlockRange {
                message: "fromBlock cannot be greater than toBlock".to_string(),
                from,
                to,
                chunk_size: None,
            });
        }
        self.fetch_range_with_report(from, to, filter, options)
            .await
    }

    async fn resolve_bounds(&self, filter: &LogFilter) -> Result<(u64, u64)> {
        let from = filter.from_block.unwrap_or(BlockTag::Earliest).resolve_static()?;
        let to = filter.to_block.unwrap_or(BlockTag::Latest).resolve_static()?;

        match (from, to) {
            (Some(from), Some(to)) => Ok((from, to)),
            (from, to) => {
                let head = self.provider.block_number().await?;
                tracing::debug!(head, "resolved latest block");
                Ok((from.unwrap_or(head), to.unwrap_or(head)))
            }
        }
    }
}

/// Fetch all logs in `from..=to` with a one-off [`LogFetcher`]
///
/// # Errors
///
/// See [`LogFetcher::fetch_range`]; also fails if `config` is invalid.
pub async fn fetch_range<P>(
    provider: Arc<P>,
    from: u64,
    to: u64,
    filter: &LogFilter,
    config: FetcherConfig,
) -> Result<Vec<Log>>
where
    P: LogProvider + ?Sized + 'static,
{
    LogFetcher::from_shared(provider, config)?
        .fetch_range(from, to, filter, FetchOptions::default())
        .await
}
