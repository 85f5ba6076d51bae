//! Scripted provider and log fixtures

use async_trait::async_trait;
use eth_log_fetcher::{BlockRange, Log, LogFilter, LogProvider, ProviderError};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// Event signature hash of ERC-20 `Transfer(address,address,uint256)`
pub const TRANSFER_TOPIC: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// USDC contract address
pub const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

/// Build a log at `block` with position `log_index`
pub fn log_at(block: u64, log_index: u64) -> Log {
    Log {
        address: USDC.to_string(),
        topics: vec![TRANSFER_TOPIC.to_string()],
        data: "0x".to_string(),
        block_number: Some(block),
        block_hash: Some(format!("0x{block:064x}")),
        transaction_hash: Some(format!("0x{:064x}", block * 1_000 + log_index)),
        transaction_index: Some(0),
        log_index: Some(log_index),
        removed: false,
    }
}

/// How a scripted chunk fails
#[derive(Clone, Debug)]
pub enum MockFailure {
    /// Generic transport failure
    Transient(String),
    /// HTTP 429 from the node
    RateLimited,
}

impl MockFailure {
    fn to_error(&self) -> ProviderError {
        match self {
            MockFailure::Transient(message) => ProviderError::Other(message.clone()),
            MockFailure::RateLimited => ProviderError::Http {
                status: 429,
                body: "Too Many Requests".to_string(),
            },
        }
    }
}

struct FailureScript {
    /// Remaining failures; None fails forever
    remaining: Option<u32>,
    failure: MockFailure,
}

type LatencyFn = Box<dyn Fn(BlockRange) -> Duration + Send + Sync>;

/// In-memory [`LogProvider`] with per-chunk scripting
///
/// By default every chunk returns `logs_per_chunk` logs, all at the chunk's start block.
/// Chunks are identified by their start block.
pub struct MockProvider {
    head: u64,
    logs_per_chunk: usize,
    counts: HashMap<u64, usize>,
    latency: Option<LatencyFn>,
    failures: Mutex<HashMap<u64, FailureScript>>,
    calls: Mutex<Vec<BlockRange>>,
    head_calls: Mutex<u32>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    /// Provider returning one log per chunk, with head block 1,000,000
    pub fn new() -> Self {
        Self {
            head: 1_000_000,
            logs_per_chunk: 1,
            counts: HashMap::new(),
            latency: None,
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            head_calls: Mutex::new(0),
        }
    }

    /// Set the value of `eth_blockNumber`
    pub fn with_head(mut self, head: u64) -> Self {
        self.head = head;
        self
    }

    /// Set how many logs each chunk returns
    pub fn with_logs_per_chunk(mut self, count: usize) -> Self {
        self.logs_per_chunk = count;
        self
    }

    /// Override the log count for the chunk starting at `start`
    pub fn with_count(mut self, start: u64, count: usize) -> Self {
        self.counts.insert(start, count);
        self
    }

    /// Delay every response by `latency(range)`
    pub fn with_latency<F>(mut self, latency: F) -> Self
    where
        F: Fn(BlockRange) -> Duration + Send + Sync + 'static,
    {
        self.latency = Some(Box::new(latency));
        self
    }

    /// Make the chunk starting at `start` fail forever
    pub fn fail_always(self, start: u64, failure: MockFailure) -> Self {
        self.script(start, None, failure)
    }

    /// Make the chunk starting at `start` fail `times` times, then succeed
    pub fn fail_times(self, start: u64, times: u32, failure: MockFailure) -> Self {
        self.script(start, Some(times), failure)
    }

    fn script(self, start: u64, remaining: Option<u32>, failure: MockFailure) -> Self {
        self.failures
            .lock()
            .unwrap()
            .insert(start, FailureScript { remaining, failure });
        self
    }

    /// Every range requested so far, in call order
    pub fn calls(&self) -> Vec<BlockRange> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of requests for the chunk starting at `start`
    pub fn calls_for(&self, start: u64) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.start() == start)
            .count()
    }

    /// Number of `eth_blockNumber` calls
    pub fn head_calls(&self) -> u32 {
        *self.head_calls.lock().unwrap()
    }

    fn next_failure(&self, start: u64) -> Option<ProviderError> {
        let mut failures = self.failures.lock().unwrap();
        let script = failures.get_mut(&start)?;
        match &mut script.remaining {
            None => Some(script.failure.to_error()),
            Some(0) => None,
            Some(n) => {
                *n -= 1;
                Some(script.failure.to_error())
            }
        }
    }
}

#[async_trait]
impl LogProvider for MockProvider {
    async fn get_logs(
        &self,
        range: BlockRange,
        _filter: &LogFilter,
    ) -> Result<Vec<Log>, ProviderError> {
        self.calls.lock().unwrap().push(range);

        if let Some(latency) = &self.latency {
            tokio::time::sleep(latency(range)).await;
        }
        if let Some(error) = self.next_failure(range.start()) {
            return Err(error);
        }

        let count = self
            .counts
            .get(&range.start())
            .copied()
            .unwrap_or(self.logs_per_chunk);
        Ok((0..count as u64).map(|i| log_at(range.start(), i)).collect())
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        *self.head_calls.lock().unwrap() += 1;
        Ok(self.head)
    }
}
