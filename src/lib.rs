//! # eth-log-fetcher
//!
//! Resilient, parallel retrieval of historical event logs from JSON-RPC blockchain nodes.
//!
//! ## Design Philosophy
//!
//! eth-log-fetcher is designed to be:
//! - **Bounded** - A large block range is split into chunks fetched under an adaptive
//!   concurrency limit that shrinks when the node keeps rate limiting
//! - **Resilient** - Every chunk is retried with exponential backoff and jitter
//! - **Honest** - Responses at the configured size ceiling are treated as truncated and
//!   retried instead of silently accepted
//! - **Ordered** - Logs come back in block order regardless of completion order
//!
//! ## Quick Start
//!
//! ```no_run
//! use eth_log_fetcher::{FetchOptions, FetcherConfig, HttpProvider, LogFetcher, LogFilter};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FetcherConfig {
//!         concurrency: 8,
//!         chunk_size: 2_000,
//!         ..Default::default()
//!     };
//!
//!     let provider = HttpProvider::new("https://eth.example.com")?;
//!     let fetcher = LogFetcher::new(provider, config)?;
//!
//!     let filter = LogFilter::new()
//!         .address("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48")
//!         .event_name("Transfer");
//!
//!     let report = fetcher
//!         .fetch_range_with_report(18_000_000, 18_050_000, &filter, FetchOptions::default())
//!         .await?;
//!
//!     println!(
//!         "{} logs, {}/{} chunks failed",
//!         report.logs.len(),
//!         report.failed_chunks.len(),
//!         report.total_chunks
//!     );
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Error types
pub mod error;
/// Bounded parallel execution
pub mod executor;
/// Chunk fetching and the public fetch entry points
pub mod fetcher;
/// Adaptive concurrency limit
pub mod governor;
/// Progress reporting
pub mod progress;
/// RPC provider abstraction and implementations
pub mod provider;
/// Block ranges, partitioning and block tags
pub mod range;
/// Request pacing with token bucket
pub mod rate_limiter;
/// Retry logic with exponential backoff
pub mod retry;
/// Per-chunk task lifecycle
pub mod task;
/// Log records and filters
pub mod types;

// Re-export commonly used types
pub use config::{ConfigOverrides, FetchOptions, FetcherConfig};
pub use error::{Error, FilterContext, IsRateLimited, ProviderError, Result};
pub use executor::{ChunkFailure, ExecutionReport, ExecutorOptions, ParallelExecutor};
pub use fetcher::{ChunkFetcher, ChunkLogs, FetchReport, LogFetcher, fetch_range};
pub use governor::ConcurrencyGovernor;
pub use progress::{ProgressCallback, ProgressTracker, ProgressUpdate};
pub use provider::{HttpProvider, LogProvider, RetryingProvider};
pub use range::{BlockRange, BlockTag, chunk_items, partition};
pub use retry::{RetryDecision, RetryPolicy};
pub use task::{FetchTask, TaskOutcome, TaskSlot, TaskState};
pub use types::{Log, LogFilter, Topic};
