//! Core types for eth-log-fetcher

use crate::error::FilterContext;
use crate::range::BlockTag;
use serde::{Deserialize, Serialize};

/// A single event log as returned by `eth_getLogs`
///
/// Records are treated as opaque by the fetch engine; no ABI decoding happens here.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    /// Emitting contract address
    pub address: String,

    /// Indexed topics; the first is usually the event signature hash
    #[serde(default)]
    pub topics: Vec<String>,

    /// Non-indexed data, hex-encoded
    #[serde(default)]
    pub data: String,

    /// Block the log was included in (None for pending logs)
    #[serde(default, with = "hex_quantity_opt")]
    pub block_number: Option<u64>,

    /// Hash of the including block
    #[serde(default)]
    pub block_hash: Option<String>,

    /// Hash of the emitting transaction
    #[serde(default)]
    pub transaction_hash: Option<String>,

    /// Position of the transaction in the block
    #[serde(default, with = "hex_quantity_opt")]
    pub transaction_index: Option<u64>,

    /// Position of the log in the block
    #[serde(default, with = "hex_quantity_opt")]
    pub log_index: Option<u64>,

    /// True if the log was removed by a chain reorganization
    #[serde(default)]
    pub removed: bool,
}

/// Topic filter for one position
///
/// Serializes to `null`, a single hash, or an array of alternatives.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Topic {
    /// Wildcard
    #[default]
    Any,
    /// Exact match
    Single(String),
    /// Match any of these
    OneOf(Vec<String>),
}

impl From<&str> for Topic {
    fn from(topic: &str) -> Self {
        Topic::Single(topic.to_string())
    }
}

impl From<String> for Topic {
    fn from(topic: String) -> Self {
        Topic::Single(topic)
    }
}

impl From<Vec<String>> for Topic {
    fn from(topics: Vec<String>) -> Self {
        Topic::OneOf(topics)
    }
}

/// Log filter criteria
///
/// `from_block`/`to_block` are only consulted by
/// [`LogFetcher::fetch_logs`](crate::LogFetcher::fetch_logs); range fetches take explicit
/// bounds. `event_name` is informational and only shows up in error context.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogFilter {
    /// Contract address to restrict to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,

    /// Topic filters by position
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<Topic>,

    /// Lower bound (defaults to `earliest`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_block: Option<BlockTag>,

    /// Upper bound (defaults to `latest`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_block: Option<BlockTag>,

    /// Name of the event the topics encode, for diagnostics
    #[serde(default, skip_serializing)]
    pub event_name: Option<String>,
}

impl LogFilter {
    /// Create an empty filter (all logs)
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict to a contract address
    #[must_use]
    pub fn address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    /// Append a topic filter for the next position
    #[must_use]
    pub fn topic(mut self, topic: impl Into<Topic>) -> Self {
        self.topics.push(topic.into());
        self
    }

    /// Set the lower bound
    #[must_use]
    pub fn from_block(mut self, block: impl Into<BlockTag>) -> Self {
        self.from_block = Some(block.into());
        self
    }

    /// Set the upper bound
    #[must_use]
    pub fn to_block(mut self, block: impl Into<BlockTag>) -> Self {
        self.to_block = Some(block.into());
        self
    }

    /// Label the filter with an event name
    #[must_use]
    pub fn event_name(mut self, name: impl Into<String>) -> Self {
        self.event_name = Some(name.into());
        self
    }

    /// Address/event context for error messages, if the filter carries any
    pub fn context(&self) -> Option<FilterContext> {
        if self.address.is_none() && self.event_name.is_none() {
            return None;
        }
        Some(FilterContext {
            address: self.address.clone(),
            event_name: self.event_name.clone(),
        })
    }
}

/// Parse a JSON-RPC hex quantity such as `"0x1b4"`
pub fn parse_quantity(value: &str) -> Option<u64> {
    let hex = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))?;
    u64::from_str_radix(hex, 16).ok()
}

/// Encode a number as a JSON-RPC hex quantity
pub fn to_quantity(value: u64) -> String {
    format!("{value:#x}")
}

// Optional hex quantity serialization helper
mod hex_quantity_opt {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<u64>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(n) => serializer.serialize_str(&super::to_quantity(*n)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        raw.map(|s| {
            super::parse_quantity(&s)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid hex quantity: {s:?}")))
        })
        .transpose()
    }
}
