//! Test configuration helpers

use eth_log_fetcher::FetcherConfig;
use std::time::Duration;

/// Configuration tuned for tests: small chunks, fast retries, no jitter
pub fn test_config() -> FetcherConfig {
    FetcherConfig {
        concurrency: 4,
        chunk_size: 100,
        max_retries: 2,
        initial_retry_delay: Duration::from_millis(100),
        max_retry_delay: Duration::from_secs(10),
        retry_jitter: false,
        ..Default::default()
    }
}

/// RPC endpoint for live tests, read from `ETH_RPC_URL` (after loading `.env`)
pub fn live_rpc_url() -> Option<String> {
    dotenvy::dotenv().ok();
    std::env::var("ETH_RPC_URL")
        .ok()
        .filter(|url| !url.trim().is_empty())
}
