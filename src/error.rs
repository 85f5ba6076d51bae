//! Error types for eth-log-fetcher
//!
//! This module provides the error taxonomy of the library:
//! - [`Error`], a flat sum type with one variant per failure kind and the context
//!   fields needed to diagnose it (block range, filter, attempt counts)
//! - [`ProviderError`], the failures surfaced by an injected [`LogProvider`]
//! - [`IsRateLimited`], the message heuristic used to detect server-side throttling
//!
//! [`LogProvider`]: crate::provider::LogProvider

use crate::range::BlockRange;
use thiserror::Error;

/// Result type alias for eth-log-fetcher operations
pub type Result<T> = std::result::Result<T, Error>;

/// Address/event context attached to chunk fetch failures
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterContext {
    /// Contract address the filter was scoped to, if any
    pub address: Option<String>,
    /// Event name the filter was built for, if known
    pub event_name: Option<String>,
}

impl FilterContext {
    fn is_empty(&self) -> bool {
        self.address.is_none() && self.event_name.is_none()
    }
}

impl std::fmt::Display for FilterContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.address, &self.event_name) {
            (Some(address), Some(event)) => write!(f, "Contract: {address}, Event: {event}"),
            (Some(address), None) => write!(f, "Contract: {address}"),
            (None, Some(event)) => write!(f, "Event: {event}"),
            (None, None) => Ok(()),
        }
    }
}

fn format_context(context: &Option<FilterContext>) -> String {
    match context {
        Some(ctx) if !ctx.is_empty() => format!(" | {ctx}"),
        _ => String::new(),
    }
}

/// Main error type for eth-log-fetcher
///
/// Chunk-level variants ([`Error::Fetch`], [`Error::Truncated`]) are retried by the
/// executor; only retry-exhausted failures escape a task. Whether a terminal failure
/// aborts the whole call depends on `continue_on_error`.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration failed validation
    #[error("invalid configuration: {message} ({})", .errors.join(", "))]
    Config {
        /// Summary of what was being validated
        message: String,
        /// Every violated constraint, in field order
        errors: Vec<String>,
    },

    /// Invalid block range or chunk size
    #[error(
        "block range error: {message} (fromBlock: {from}, toBlock: {to}, chunkSize: {})",
        .chunk_size.map(|c| c.to_string()).unwrap_or_else(|| "N/A".to_string())
    )]
    BlockRange {
        /// What was wrong with the range
        message: String,
        /// Requested start block
        from: u64,
        /// Requested end block
        to: u64,
        /// Requested chunk size, when one was involved
        chunk_size: Option<u64>,
    },

    /// Block tag that cannot be resolved to a concrete block number
    #[error("{0}")]
    UnsupportedBlockTag(String),

    /// A chunk's RPC call failed
    #[error("failed to fetch logs | Blocks: {range}{}: {source}", format_context(.context))]
    Fetch {
        /// The sub-range that was being fetched
        range: BlockRange,
        /// Address/event the filter was scoped to
        context: Option<FilterContext>,
        /// The underlying provider failure
        #[source]
        source: ProviderError,
    },

    /// A chunk returned at least as many records as the truncation threshold
    #[error(
        "potential log truncation detected: chunk {range} returned {count} logs, which meets or exceeds the limit of {limit}; consider using a smaller chunk size"
    )]
    Truncated {
        /// The sub-range whose result was rejected
        range: BlockRange,
        /// Number of records the provider returned
        count: usize,
        /// Configured `max_logs_per_chunk`
        limit: usize,
    },

    /// A chunk exhausted its retries and the last failure was rate-limit-flavored
    #[error("rate limit exceeded for blocks {range} after {attempts} attempts: {source}")]
    RateLimited {
        /// The sub-range that could not be fetched
        range: BlockRange,
        /// Total number of attempts made (initial call + retries)
        attempts: u32,
        /// The last failure observed
        #[source]
        source: Box<Error>,
    },

    /// Fail-fast execution aborted on the first terminal task failure
    #[error("parallel execution failed ({failed}/{total} tasks failed): {first}")]
    Execution {
        /// Number of tasks that had failed terminally when execution aborted
        failed: usize,
        /// Number of tasks submitted
        total: usize,
        /// The first terminal failure, by completion order
        #[source]
        first: Box<Error>,
    },

    /// Provider call outside of a chunk fetch (e.g. resolving `latest`)
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// A spawned task panicked before producing an outcome
    #[error("task {index} panicked")]
    TaskPanicked {
        /// Index of the task in the submitted sequence
        index: usize,
    },

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Machine-readable code for this error kind
    pub fn code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "CONFIGURATION_ERROR",
            Error::BlockRange { .. } => "BLOCK_RANGE_ERROR",
            Error::UnsupportedBlockTag(_) => "BLOCK_TAG_ERROR",
            Error::Fetch { .. } => "EVENT_FETCH_ERROR",
            Error::Truncated { .. } => "CHUNK_TRUNCATION_ERROR",
            Error::RateLimited { .. } => "RATE_LIMIT_ERROR",
            Error::Execution { .. } => "PARALLEL_EXECUTION_ERROR",
            Error::Provider(_) => "PROVIDER_ERROR",
            Error::TaskPanicked { .. } => "TASK_PANICKED",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }

    /// Block range the error is attributed to, if it is chunk-scoped
    pub fn block_range(&self) -> Option<BlockRange> {
        match self {
            Error::Fetch { range, .. }
            | Error::Truncated { range, .. }
            | Error::RateLimited { range, .. } => Some(*range),
            Error::Execution { first, .. } => first.block_range(),
            _ => None,
        }
    }
}

/// Failures of the injected RPC capability
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The endpoint answered with a non-success HTTP status
    #[error("HTTP {status}: {body}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body, possibly empty
        body: String,
    },

    /// The endpoint answered with a JSON-RPC error object
    #[error("JSON-RPC error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// JSON-RPC error message
        message: String,
    },

    /// Connection, timeout or body-decoding failure in the HTTP client
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The response could not be interpreted
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Provider-level retries were exhausted
    #[error("provider operation failed after {attempts} attempts: {message}")]
    RetriesExhausted {
        /// Total attempts made
        attempts: u32,
        /// Message of the last failure
        message: String,
    },

    /// Provider-level retries were exhausted on a rate-limited endpoint
    #[error("rate limit exceeded after {attempts} attempts: {message}")]
    RateLimited {
        /// Total attempts made
        attempts: u32,
        /// Message of the last failure
        message: String,
    },

    /// Other provider failure
    #[error("{0}")]
    Other(String),
}

/// Trait for errors that can be classified as server-side throttling
///
/// The classification is a case-insensitive message heuristic. False positives only
/// cost a longer backoff, never correctness.
pub trait IsRateLimited {
    /// Returns true if the error looks like it was caused by rate limiting
    fn is_rate_limited(&self) -> bool;
}

impl IsRateLimited for str {
    fn is_rate_limited(&self) -> bool {
        let msg = self.to_lowercase();
        msg.contains("429")
            || msg.contains("rate limit")
            || msg.contains("too many requests")
            || msg.contains("throttled")
            || (msg.contains("exceeded") && msg.contains("capacity"))
    }
}

impl IsRateLimited for Error {
    fn is_rate_limited(&self) -> bool {
        match self {
            Error::RateLimited { .. } => true,
            Error::Fetch { source, .. } => source.is_rate_limited(),
            Error::Provider(e) => e.is_rate_limited(),
            // Local validation failures never come from the server
            Error::Config { .. }
            | Error::BlockRange { .. }
            | Error::UnsupportedBlockTag(_)
            | Error::Truncated { .. } => false,
            other => other.to_string().as_str().is_rate_limited(),
        }
    }
}

impl IsRateLimited for ProviderError {
    fn is_rate_limited(&self) -> bool {
        match self {
            ProviderError::Http { status: 429, .. } | ProviderError::RateLimited { .. } => true,
            other => other.to_string().as_str().is_rate_limited(),
        }
    }
}
