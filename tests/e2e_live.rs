#![cfg(feature = "live-tests")]
//! End-to-end tests against a real JSON-RPC node
//!
//! Gated behind the `live-tests` feature flag. Requires `ETH_RPC_URL` in `.env` or the
//! environment; tests skip themselves when it is missing.
//!
//! ```bash
//! cargo test --features live-tests --test e2e_live -- --nocapture
//! ```

mod common;

use common::{TRANSFER_TOPIC, USDC, assert_block_ordered, assert_within, live_rpc_url};
use eth_log_fetcher::{
    BlockRange, FetchOptions, FetcherConfig, HttpProvider, LogFetcher, LogFilter, LogProvider,
};
use std::time::Duration;

fn live_fetcher(url: &str) -> LogFetcher<HttpProvider> {
    let provider = HttpProvider::with_timeout(url, Duration::from_secs(30)).unwrap();
    let config = FetcherConfig {
        concurrency: 3,
        chunk_size: 500,
        rate_limit_per_second: Some(10),
        ..Default::default()
    };
    LogFetcher::new(provider, config).unwrap()
}

#[tokio::test]
async fn head_block_is_recent() {
    let Some(url) = live_rpc_url() else {
        eprintln!("Skipping: ETH_RPC_URL not set");
        return;
    };

    let provider = HttpProvider::new(&url).unwrap();
    let head = provider.block_number().await.unwrap();
    println!("head block: {head}");
    assert!(head > 18_000_000, "unexpectedly old head {head}");
}

#[tokio::test]
async fn usdc_transfers_over_two_thousand_blocks() {
    let Some(url) = live_rpc_url() else {
        eprintln!("Skipping: ETH_RPC_URL not set");
        return;
    };

    let fetcher = live_fetcher(&url);
    let filter = LogFilter::new()
        .address(USDC)
        .topic(TRANSFER_TOPIC)
        .event_name("Transfer");

    let (from, to) = (18_000_000, 18_001_999);
    let report = fetcher
        .fetch_range_with_report(
            from,
            to,
            &filter,
            FetchOptions {
                show_progress: Some(true),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    println!(
        "{} logs, {}/{} chunks failed",
        report.logs.len(),
        report.failed_chunks.len(),
        report.total_chunks
    );
    assert_eq!(report.total_chunks, 4);
    assert!(report.is_complete(), "{:?}", report.failed_chunks);
    assert!(!report.logs.is_empty(), "USDC always has transfers");
    assert_block_ordered(&report.logs);
    assert_within(&report.logs, BlockRange::new(from, to).unwrap());
}
