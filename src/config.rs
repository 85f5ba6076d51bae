//! Configuration types for eth-log-fetcher
//!
//! A [`FetcherConfig`] is built in layers: built-in defaults, then `ETH_FETCHER_*`
//! environment variables, then explicit [`ConfigOverrides`] (last wins). The result is
//! validated once and treated as immutable for the duration of a fetch call.

use crate::error::{Error, Result};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable names read by [`FetcherConfig::from_env`]
pub mod env_vars {
    /// Maximum number of chunks fetched concurrently
    pub const CONCURRENCY: &str = "ETH_FETCHER_CONCURRENCY";
    /// Blocks per chunk
    pub const CHUNK_SIZE: &str = "ETH_FETCHER_CHUNK_SIZE";
    /// Retries per chunk after the initial attempt
    pub const MAX_RETRIES: &str = "ETH_FETCHER_MAX_RETRIES";
    /// Initial retry delay in milliseconds
    pub const INITIAL_RETRY_DELAY: &str = "ETH_FETCHER_INITIAL_RETRY_DELAY";
    /// Provider request budget per second
    pub const RATE_LIMIT_PER_SECOND: &str = "ETH_FETCHER_RATE_LIMIT_PER_SECOND";
    /// Log progress lines while fetching
    pub const SHOW_PROGRESS: &str = "ETH_FETCHER_SHOW_PROGRESS";
    /// Keep going when a chunk fails terminally
    pub const CONTINUE_ON_ERROR: &str = "ETH_FETCHER_CONTINUE_ON_ERROR";
    /// Truncation threshold per chunk
    pub const MAX_LOGS_PER_CHUNK: &str = "ETH_FETCHER_MAX_LOGS_PER_CHUNK";
}

/// Fully resolved fetcher configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FetcherConfig {
    /// Maximum chunks fetched concurrently (default: 4, valid: 1-50)
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Blocks per chunk (default: 10000, valid: 100-100000)
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Retries per chunk after the initial attempt (default: 3, valid: 0-10)
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay for exponential backoff (default: 1s, valid: 100ms-30s)
    #[serde(default = "default_initial_retry_delay", with = "duration_millis")]
    pub initial_retry_delay: Duration,

    /// Upper bound on any single backoff delay (default: 60s)
    #[serde(default = "default_max_retry_delay", with = "duration_millis")]
    pub max_retry_delay: Duration,

    /// Randomize backoff delays (default: true)
    #[serde(default = "default_true")]
    pub retry_jitter: bool,

    /// Provider request budget per second (None = unpaced, valid: 1-1000)
    #[serde(default)]
    pub rate_limit_per_second: Option<u32>,

    /// Emit progress lines through `tracing` (default: false)
    #[serde(default)]
    pub show_progress: bool,

    /// Keep fetching when a chunk fails terminally (default: true)
    ///
    /// When false, the first terminal chunk failure aborts the call with
    /// [`Error::Execution`].
    #[serde(default = "default_true")]
    pub continue_on_error: bool,

    /// A chunk returning at least this many logs is treated as truncated
    /// (default: 10000, valid: 1-1000000)
    #[serde(default = "default_max_logs_per_chunk")]
    pub max_logs_per_chunk: usize,

    /// Called after every chunk reaches a final state
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            initial_retry_delay: default_initial_retry_delay(),
            max_retry_delay: default_max_retry_delay(),
            retry_jitter: true,
            rate_limit_per_second: None,
            show_progress: false,
            continue_on_error: true,
            max_logs_per_chunk: default_max_logs_per_chunk(),
            progress_callback: None,
        }
    }
}

impl FetcherConfig {
    /// Build a configuration from defaults, the process environment and `overrides`
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the merged configuration is out of range.
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), overrides)
    }

    /// Like [`FetcherConfig::from_env`], reading variables through `lookup`
    ///
    /// Integers below a field's minimum and unparsable values are ignored, so the
    /// default (or override) stays in effect.
    pub fn from_lookup<F>(lookup: F, overrides: ConfigOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply(env_overrides(&lookup));
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Merge `overrides` into this configuration, field by field
    pub fn apply(&mut self, overrides: ConfigOverrides) {
        let ConfigOverrides {
            concurrency,
            chunk_size,
            max_retries,
            initial_retry_delay,
            max_retry_delay,
            retry_jitter,
            rate_limit_per_second,
            show_progress,
            continue_on_error,
            max_logs_per_chunk,
            progress_callback,
        } = overrides;

        if let Some(v) = concurrency {
            self.concurrency = v;
        }
        if let Some(v) = chunk_size {
            self.chunk_size = v;
        }
        if let Some(v) = max_retries {
            self.max_retries = v;
        }
        if let Some(v) = initial_retry_delay {
            self.initial_retry_delay = v;
        }
        if let Some(v) = max_retry_delay {
            self.max_retry_delay = v;
        }
        if let Some(v) = retry_jitter {
            self.retry_jitter = v;
        }
        if let Some(v) = rate_limit_per_second {
            self.rate_limit_per_second = Some(v);
        }
        if let Some(v) = show_progress {
            self.show_progress = v;
        }
        if let Some(v) = continue_on_error {
            self.continue_on_error = v;
        }
        if let Some(v) = max_logs_per_chunk {
            self.max_logs_per_chunk = v;
        }
        if let Some(cb) = progress_callback {
            self.progress_callback = Some(cb);
        }
    }

    /// Return a copy with `overrides` merged in, validated
    pub fn merged(&self, overrides: ConfigOverrides) -> Result<Self> {
        let mut config = self.clone();
        config.apply(overrides);
        config.validate()?;
        Ok(config)
    }

    /// Check every field against its valid range, reporting all violations at once
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if !(1..=50).contains(&self.concurrency) {
            errors.push("concurrency must be between 1 and 50".to_string());
        }
        if !(100..=100_000).contains(&self.chunk_size) {
            errors.push("chunkSize must be between 100 and 100,000".to_string());
        }
        if self.max_retries > 10 {
            errors.push("maxRetries must be between 0 and 10".to_string());
        }
        if self.initial_retry_delay < Duration::from_millis(100)
            || self.initial_retry_delay > Duration::from_secs(30)
        {
            errors.push("initialRetryDelay must be between 100ms and 30 seconds".to_string());
        }
        if self.max_retry_delay < self.initial_retry_delay {
            errors.push("maxRetryDelay must not be shorter than initialRetryDelay".to_string());
        }
        if self
            .rate_limit_per_second
            .is_some_and(|rps| !(1..=1000).contains(&rps))
        {
            errors.push("rateLimitPerSecond must be between 1 and 1000".to_string());
        }
        if !(1..=1_000_000).contains(&self.max_logs_per_chunk) {
            errors.push("maxLogsPerChunk must be between 1 and 1,000,000".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(Error::Config {
                message: "configuration validation failed".to_string(),
                errors,
            })
        }
    }
}

/// Partial configuration; `None` fields leave the underlying value untouched
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// See [`FetcherConfig::concurrency`]
    pub concurrency: Option<usize>,
    /// See [`FetcherConfig::chunk_size`]
    pub chunk_size: Option<u64>,
    /// See [`FetcherConfig::max_retries`]
    pub max_retries: Option<u32>,
    /// See [`FetcherConfig::initial_retry_delay`]
    pub initial_retry_delay: Option<Duration>,
    /// See [`FetcherConfig::max_retry_delay`]
    pub max_retry_delay: Option<Duration>,
    /// See [`FetcherConfig::retry_jitter`]
    pub retry_jitter: Option<bool>,
    /// See [`FetcherConfig::rate_limit_per_second`]
    pub rate_limit_per_second: Option<u32>,
    /// See [`FetcherConfig::show_progress`]
    pub show_progress: Option<bool>,
    /// See [`FetcherConfig::continue_on_error`]
    pub continue_on_error: Option<bool>,
    /// See [`FetcherConfig::max_logs_per_chunk`]
    pub max_logs_per_chunk: Option<usize>,
    /// See [`FetcherConfig::progress_callback`]
    pub progress_callback: Option<ProgressCallback>,
}

/// Per-call options for a fetch, merged over the fetcher's configuration
pub type FetchOptions = ConfigOverrides;

fn env_overrides<F>(lookup: &F) -> ConfigOverrides
where
    F: Fn(&str) -> Option<String>,
{
    ConfigOverrides {
        concurrency: parse_number(lookup(env_vars::CONCURRENCY), 1),
        chunk_size: parse_number(lookup(env_vars::CHUNK_SIZE), 100),
        max_retries: parse_number(lookup(env_vars::MAX_RETRIES), 0),
        initial_retry_delay: parse_number(lookup(env_vars::INITIAL_RETRY_DELAY), 100)
            .map(Duration::from_millis),
        rate_limit_per_second: parse_number(lookup(env_vars::RATE_LIMIT_PER_SECOND), 1),
        show_progress: parse_bool(lookup(env_vars::SHOW_PROGRESS)),
        continue_on_error: parse_bool(lookup(env_vars::CONTINUE_ON_ERROR)),
        max_logs_per_chunk: parse_number(lookup(env_vars::MAX_LOGS_PER_CHUNK), 1),
        ..Default::default()
    }
}

fn parse_number<T>(value: Option<String>, min: T) -> Option<T>
where
    T: std::str::FromStr + PartialOrd,
{
    let parsed = value?.trim().parse::<T>().ok()?;
    (parsed >= min).then_some(parsed)
}

fn parse_bool(value: Option<String>) -> Option<bool> {
    let value = value?;
    if value.is_empty() {
        return None;
    }
    Some(value.eq_ignore_ascii_case("true") || value == "1")
}

fn default_concurrency() -> usize {
    4
}

fn default_chunk_size() -> u64 {
    10_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_retry_delay() -> Duration {
    Duration::from_millis(1000)
}

fn default_max_retry_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_max_logs_per_chunk() -> usize {
    10_000
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (milliseconds)
mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
