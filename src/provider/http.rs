//! JSON-RPC over HTTP

use super::LogProvider;
use crate::error::ProviderError;
use crate::range::BlockRange;
use crate::types::{Log, LogFilter, parse_quantity, to_quantity};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use url::Url;

/// [`LogProvider`] backed by a JSON-RPC HTTP endpoint
///
/// Non-2xx responses become [`ProviderError::Http`] (so a 429 is classified as rate
/// limiting), and JSON-RPC error objects become [`ProviderError::Rpc`].
#[derive(Debug)]
pub struct HttpProvider {
    client: reqwest::Client,
    url: Url,
    next_id: AtomicU64,
}

#[derive(Deserialize)]
struct RpcResponse<R> {
    result: Option<R>,
    error: Option<RpcErrorObject>,
}

#[derive(Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

impl HttpProvider {
    /// Create a provider for `url` with no request timeout
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::Other`] if `url` is not a valid URL.
    pub fn new(url: impl AsRef<str>) -> Result<Self, ProviderError> {
        Ok(Self::with_client(reqwest::Client::new(), parse_url(url.as_ref())?))
    }

    /// Create a provider whose requests time out after `timeout`
    ///
    /// # Errors
    ///
    /// Returns an error if `url` is invalid or the HTTP client cannot be built.
    pub fn with_timeout(url: impl AsRef<str>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, parse_url(url.as_ref())?))
    }

    /// Create a provider from a preconfigured client
    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self {
            client,
            url,
            next_id: AtomicU64::new(1),
        }
    }

    /// Endpoint URL
    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn request<R>(&self, method: &str, params: Value) -> Result<R, ProviderError>
    where
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        tracing::trace!(method, id, "sending JSON-RPC request");
        let response = self.client.post(self.url.clone()).json(&body).send().await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: RpcResponse<R> = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("{method}: {e}")))?;

        if let Some(err) = parsed.error {
            return Err(ProviderError::Rpc {
                code: err.code,
                message: err.message,
            });
        }

        parsed
            .result
            .ok_or_else(|| ProviderError::InvalidResponse(format!("{method}: missing result")))
    }
}

#[async_trait]
impl LogProvider for HttpProvider {
    async fn get_logs(
        &self,
        range: BlockRange,
        filter: &LogFilter,
    ) -> Result<Vec<Log>, ProviderError> {
        let mut criteria = Map::new();
        criteria.insert("fromBlock".to_string(), json!(to_quantity(range.start())));
        criteria.insert("toBlock".to_string(), json!(to_quantity(range.end())));
        if let Some(address) = &filter.address {
            criteria.insert("address".to_string(), json!(address));
        }
        if !filter.topics.is_empty() {
            criteria.insert("topics".to_string(), json!(filter.topics));
        }

        self.request("eth_getLogs", json!([Value::Object(criteria)]))
            .await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        let raw: String = self.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
            .ok_or_else(|| ProviderError::InvalidResponse(format!("invalid block number: {raw}")))
    }
}

fn parse_url(url: &str) -> Result<Url, ProviderError> {
    Url::parse(url).map_err(|e| ProviderError::Other(format!("invalid RPC URL {url:?}: {e}")))
}
