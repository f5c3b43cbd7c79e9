//! JSON-RPC transport and the production [`ChainReader`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ChainReader, LogFilter, RawLog};
use crate::domain::ChainError;

#[derive(Debug, Deserialize)]
struct RpcEnvelope {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client over HTTP.
///
/// Requests go to each URL in order until one answers; the last error is
/// returned when every endpoint fails.
#[derive(Debug)]
pub struct RpcClient {
    http: reqwest::Client,
    urls: Vec<String>,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(urls: Vec<String>, timeout: Duration) -> Result<Self, ChainError> {
        if urls.is_empty() {
            return Err(ChainError::NoEndpoint);
        }
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            urls,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, ChainError> {
        let mut last_err = ChainError::NoEndpoint;
        for url in &self.urls {
            match self.request_once(url, method, &params).await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(url = %url, method, error = %err, "rpc request failed");
                    last_err = err;
                }
            }
        }
        Err(last_err)
    }

    async fn request_once<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &str,
        params: &Value,
    ) -> Result<T, ChainError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });
        debug!(url, method, id, "rpc request");

        let response = self.http.post(url).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ChainError::Transport(format!("http status {status}")));
        }
        let envelope: RpcEnvelope = response
            .json()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;
        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc {
                code: err.code,
                message: err.message,
            });
        }
        serde_json::from_value(envelope.result.unwrap_or(Value::Null))
            .map_err(|e| ChainError::Decode(format!("{method}: {e}")))
    }
}

/// Parse a JSON-RPC hex quantity (`0x1a`).
pub fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ChainError::Decode(format!("quantity without 0x prefix: {raw}")))?;
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("bad quantity {raw}: {e}")))
}

pub fn format_quantity(n: u64) -> String {
    format!("{n:#x}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    #[serde(default)]
    data: Bytes,
    block_number: Option<String>,
    transaction_hash: Option<B256>,
    log_index: Option<String>,
    #[serde(default)]
    removed: bool,
}

impl RpcLog {
    /// `None` for pending or reorged-out entries.
    fn into_raw(self) -> Result<Option<RawLog>, ChainError> {
        if self.removed {
            return Ok(None);
        }
        let Some(block) = self.block_number.as_deref() else {
            return Ok(None);
        };
        Ok(Some(RawLog {
            address: self.address,
            topics: self.topics,
            data: self.data,
            block_number: parse_quantity(block)?,
            transaction_hash: self.transaction_hash.unwrap_or_default(),
            log_index: self
                .log_index
                .as_deref()
                .map(parse_quantity)
                .transpose()?
                .unwrap_or_default(),
        }))
    }
}

/// [`ChainReader`] backed by `eth_getLogs`, `eth_call` and `eth_blockNumber`.
#[derive(Debug)]
pub struct RpcChainReader {
    client: RpcClient,
}

impl RpcChainReader {
    pub fn new(client: RpcClient) -> Self {
        Self { client }
    }

    pub fn from_urls(urls: Vec<String>, timeout: Duration) -> Result<Self, ChainError> {
        Ok(Self::new(RpcClient::new(urls, timeout)?))
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError> {
        let params = json!([{
            "address": filter.address,
            "topics": filter.topics,
            "fromBlock": format_quantity(filter.from_block),
            "toBlock": format_quantity(filter.to_block),
        }]);
        let logs: Vec<RpcLog> = self.client.request("eth_getLogs", params).await?;

        let mut out = Vec::with_capacity(logs.len());
        for log in logs {
            if let Some(raw) = log.into_raw()? {
                out.push(raw);
            }
        }
        Ok(out)
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, ChainError> {
        let params = json!([{ "to": to, "data": data }, "latest"]);
        self.client.request("eth_call", params).await
    }

    async fn block_number(&self) -> Result<u64, ChainError> {
        let raw: String = self.client.request("eth_blockNumber", json!([])).await?;
        parse_quantity(&raw)
    }
}
