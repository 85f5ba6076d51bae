//! Custom assertions for fetched logs

use eth_log_fetcher::{BlockRange, Log};

/// Assert that logs are sorted by block number (ties allowed)
pub fn assert_block_ordered(logs: &[Log]) {
    let blocks: Vec<u64> = logs.iter().filter_map(|log| log.block_number).collect();
    assert_eq!(blocks.len(), logs.len(), "every log should carry a block number");
    assert!(
        blocks.windows(2).all(|pair| pair[0] <= pair[1]),
        "logs out of block order: {blocks:?}"
    );
}

/// Assert that every log lies inside `range`
pub fn assert_within(logs: &[Log], range: BlockRange) {
    for log in logs {
        let block = log.block_number.unwrap_or_default();
        assert!(
            range.contains(block),
            "log at block {block} outside requested range {range}"
        );
    }
}

/// Assert that `ranges`, sorted by start, tile `from..=to` exactly
pub fn assert_tiles(ranges: &[BlockRange], from: u64, to: u64) {
    let mut sorted = ranges.to_vec();
    sorted.sort_by_key(BlockRange::start);
    sorted.dedup();

    assert_eq!(sorted.first().map(BlockRange::start), Some(from), "{sorted:?}");
    assert_eq!(sorted.last().map(BlockRange::end), Some(to), "{sorted:?}");
    for pair in sorted.windows(2) {
        assert_eq!(
            pair[0].end() + 1,
            pair[1].start(),
            "gap or overlap between {} and {}",
            pair[0],
            pair[1]
        );
    }
}
