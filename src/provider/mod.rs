//! RPC capability used by the fetch engine
//!
//! The engine only needs two calls from a node: logs for an inclusive block range, and
//! the current head block. [`LogProvider`] abstracts both so the engine can be driven
//! by a real endpoint or by a scripted test double.
//!
//! ## Implementations
//!
//! - [`HttpProvider`]: JSON-RPC over HTTP (`eth_getLogs`, `eth_blockNumber`)
//! - [`RetryingProvider`]: decorator adding per-call exponential backoff to any provider
//!
//! ## Usage
//!
//! ```no_run
//! use eth_log_fetcher::provider::{HttpProvider, LogProvider, RetryingProvider};
//! use eth_log_fetcher::retry::RetryPolicy;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let http = HttpProvider::new("https://eth.example.com")?;
//! let provider = RetryingProvider::new(http, RetryPolicy::default());
//!
//! let head = provider.block_number().await?;
//! println!("chain head: {head}");
//! # Ok(())
//! # }
//! ```

use crate::error::ProviderError;
use crate::range::BlockRange;
use crate::types::{Log, LogFilter};
use async_trait::async_trait;
use std::sync::Arc;

mod http;
mod retrying;

pub use http::HttpProvider;
pub use retrying::RetryingProvider;

/// Source of event logs
///
/// Implementations perform exactly one remote call per method invocation; chunking
/// and retries belong to the caller.
#[async_trait]
pub trait LogProvider: Send + Sync {
    /// Fetch logs matching `filter` in the inclusive `range`
    ///
    /// The filter's own `from_block`/`to_block` are ignored in favour of `range`.
    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, ProviderError>;

    /// Current head block number
    async fn block_number(&self) -> Result<u64, ProviderError>;
}

#[async_trait]
impl<P> LogProvider for Arc<P>
where
    P: LogProvider + ?Sized,
{
    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, ProviderError> {
        (**self).get_logs(range, filter).await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        (**self).block_number().await
    }
}
