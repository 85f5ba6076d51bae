//! Block ranges, range partitioning and block tags

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Inclusive block range `[start, end]`
///
/// Invariant: `start <= end`. Construct through [`BlockRange::new`] or
/// [`partition`]; the fields are read-only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "(u64, u64)", into = "(u64, u64)")]
pub struct BlockRange {
    start: u64,
    end: u64,
}

impl BlockRange {
    /// Create a range, failing if `start > end`
    pub fn new(start: u64, end: u64) -> Result<Self> {
        if start > end {
            return Err(Error::BlockRange {
                message: "Start block must be less than or equal to end block".to_string(),
                from: start,
                to: end,
                chunk_size: None,
            });
        }
        Ok(Self { start, end })
    }

    /// First block of the range
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Last block of the range (inclusive)
    pub fn end(&self) -> u64 {
        self.end
    }

    /// Number of blocks covered, saturating at `u64::MAX` for `0..=u64::MAX`
    pub fn len(&self) -> u64 {
        (self.end - self.start).saturating_add(1)
    }

    /// Always false; a range covers at least one block
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether `block` falls inside the range
    pub fn contains(&self, block: u64) -> bool {
        (self.start..=self.end).contains(&block)
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

impl TryFrom<(u64, u64)> for BlockRange {
    type Error = Error;

    fn try_from((start, end): (u64, u64)) -> Result<Self> {
        Self::new(start, end)
    }
}

impl From<BlockRange> for (u64, u64) {
    fn from(range: BlockRange) -> Self {
        (range.start, range.end)
    }
}

/// Split `[from, to]` into ordered, contiguous sub-ranges of at most `chunk_size` blocks
///
/// The returned ranges tile the input exactly: no gaps, no overlaps, ascending order.
///
/// # Errors
///
/// Returns [`Error::BlockRange`] if `from > to` or `chunk_size == 0`.
///
/// # Examples
///
/// ```
/// use eth_log_fetcher::range::partition;
///
/// let chunks = partition(100, 200, 50).unwrap();
/// let bounds: Vec<_> = chunks.iter().map(|c| (c.start(), c.end())).collect();
/// assert_eq!(bounds, vec![(100, 149), (150, 199), (200, 200)]);
/// ```
pub fn partition(from: u64, to: u64, chunk_size: u64) -> Result<Vec<BlockRange>> {
    if from > to {
        return Err(Error::BlockRange {
            message: "Start block must be less than or equal to end block".to_string(),
            from,
            to,
            chunk_size: Some(chunk_size),
        });
    }
    if chunk_size == 0 {
        return Err(Error::BlockRange {
            message: "Chunk size must be positive".to_string(),
            from,
            to,
            chunk_size: Some(chunk_size),
        });
    }

    let capacity = chunk_count(from, to, chunk_size)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(0);
    let mut chunks = Vec::with_capacity(capacity);
    let mut cursor = from;
    loop {
        // saturating: a chunk ending at u64::MAX must not wrap
        let end = cursor.saturating_add(chunk_size - 1).min(to);
        chunks.push(BlockRange { start: cursor, end });
        match end.checked_add(1) {
            Some(next) if next <= to => cursor = next,
            _ => break,
        }
    }
    Ok(chunks)
}

/// Number of chunks `partition` emits, or None if it does not fit in a `u64`
fn chunk_count(from: u64, to: u64, chunk_size: u64) -> Option<u64> {
    ((to - from) / chunk_size).checked_add(1)
}

/// Split a slice into owned chunks of at most `chunk_size` items
///
/// A `chunk_size` of zero yields no chunks.
pub fn chunk_items<T: Clone>(items: &[T], chunk_size: usize) -> Vec<Vec<T>> {
    if chunk_size == 0 {
        return Vec::new();
    }
    items.chunks(chunk_size).map(<[T]>::to_vec).collect()
}

/// Block reference as accepted by `eth_getLogs`
///
/// Deserializes from a JSON number, a decimal or `0x`-hex string, or one of the tags
/// `"earliest"`, `"latest"`, `"pending"`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BlockTag {
    /// A concrete block number
    Number(u64),
    /// The genesis block (block 0)
    Earliest,
    /// The current chain head
    #[default]
    Latest,
    /// The pending block; never resolvable for historical fetches
    Pending,
}

impl BlockTag {
    /// Resolve to a concrete block number without consulting the chain
    ///
    /// Returns `Ok(None)` for [`BlockTag::Latest`], which needs the provider.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedBlockTag`] for [`BlockTag::Pending`].
    pub fn resolve_static(self) -> Result<Option<u64>> {
        match self {
            BlockTag::Number(n) => Ok(Some(n)),
            BlockTag::Earliest => Ok(Some(0)),
            BlockTag::Latest => Ok(None),
            BlockTag::Pending => Err(Error::UnsupportedBlockTag(
                "Pending block tag is not supported".to_string(),
            )),
        }
    }
}

impl From<u64> for BlockTag {
    fn from(n: u64) -> Self {
        BlockTag::Number(n)
    }
}

impl std::fmt::Display for BlockTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockTag::Number(n) => write!(f, "{n}"),
            BlockTag::Earliest => f.write_str("earliest"),
            BlockTag::Latest => f.write_str("latest"),
            BlockTag::Pending => f.write_str("pending"),
        }
    }
}

impl std::str::FromStr for BlockTag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "earliest" => return Ok(BlockTag::Earliest),
            "latest" => return Ok(BlockTag::Latest),
            "pending" => return Ok(BlockTag::Pending),
            _ => {}
        }

        let parsed = match trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
        {
            Some(hex) => u64::from_str_radix(hex, 16),
            None => trimmed.parse::<u64>(),
        };
        parsed
            .map(BlockTag::Number)
            .map_err(|_| Error::UnsupportedBlockTag(format!("invalid block tag: {s:?}")))
    }
}

impl Serialize for BlockTag {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            BlockTag::Number(n) => serializer.serialize_str(&format!("{n:#x}")),
            other => serializer.serialize_str(&other.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for BlockTag {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(BlockTag::Number(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}
