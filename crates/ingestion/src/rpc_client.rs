//! Ethereum JSON-RPC client with bounded retries.

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use govsnap_telemetry::Metrics;

/// Connection and retry settings for [`RpcClient`].
#[derive(Debug, Clone)]
pub struct RpcConfig {
    /// HTTP/HTTPS JSON-RPC endpoint URL.
    pub url: String,
    /// Retries after the first attempt before a call is abandoned.
    pub max_retries: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub request_timeout: Duration,
}

impl RpcConfig {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            max_retries: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// A log entry as returned by `eth_getLogs`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub block_number: u64,
    pub log_index: u64,
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    log_index: Option<String>,
}

/// Failure of a single RPC attempt.
enum CallError {
    /// Worth retrying: transport failures, HTTP errors, provider errors.
    Transient(anyhow::Error),
    /// The node answered definitively, e.g. a reverted `eth_call`.
    Rejected(anyhow::Error),
}

/// Ethereum RPC client wrapper.
pub struct RpcClient {
    client: Client,
    config: RpcConfig,
    metrics: Metrics,
}

impl RpcClient {
    /// Create a new RPC client.
    ///
    /// # Arguments
    /// * `config` - Endpoint and retry settings
    /// * `metrics` - Metrics collector
    pub fn new(config: RpcConfig, metrics: Metrics) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .context("Failed to build HTTP client")?;

        info!(
            "Initialized RPC client for {} (max {} retries)",
            config.url, config.max_retries
        );

        Ok(Self {
            client,
            config,
            metrics,
        })
    }

    async fn call_once(&self, method: &str, params: &Value) -> std::result::Result<Value, CallError> {
        let payload = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| CallError::Transient(e.into()))?;

        if !response.status().is_success() {
            return Err(CallError::Transient(anyhow::anyhow!(
                "RPC request failed with status: {}",
                response.status()
            )));
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| CallError::Transient(e.into()))?;

        // Check for RPC error
        if let Some(error) = result.get("error") {
            let err = anyhow::anyhow!("RPC error: {}", error);
            return Err(if is_revert(error) {
                CallError::Rejected(err)
            } else {
                CallError::Transient(err)
            });
        }

        Ok(result["result"].clone())
    }

    async fn call_rpc(&self, method: &str, params: Value) -> Result<Value> {
        let mut attempt: u32 = 0;
        loop {
            let start = Instant::now();
            let outcome = self.call_once(method, &params).await;
            self.metrics
                .observe_rpc_latency(method, start.elapsed().as_secs_f64());

            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(CallError::Rejected(err)) => return Err(err),
                Err(CallError::Transient(err)) => err,
            };

            self.metrics.inc_rpc_errors();
            if attempt >= self.config.max_retries {
                return Err(err.context(format!(
                    "{} failed after {} attempts",
                    method,
                    attempt + 1
                )));
            }

            let delay = self.backoff(attempt);
            attempt += 1;
            self.metrics.inc_rpc_retries();
            warn!(
                "RPC {} failed (attempt {}), retrying in {:?}: {}",
                method, attempt, delay, err
            );
            sleep(delay).await;
        }
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .base_delay
            .saturating_mul(1u32 << attempt.min(16))
            .min(self.config.max_delay)
    }

    /// Get the latest block number.
    pub async fn get_latest_block_number(&self) -> Result<u64> {
        let result = self.call_rpc("eth_blockNumber", json!([])).await?;
        let hex_str = result.as_str().context("Invalid eth_blockNumber response")?;
        let block_num = parse_quantity(hex_str)?;
        debug!("Latest block number: {}", block_num);
        Ok(block_num)
    }

    /// Get all logs emitted by `address` whose first topic is one of
    /// `topics`, from genesis through `to_block`.
    pub async fn get_logs(&self, address: Address, topics: &[B256], to_block: u64) -> Result<Vec<RawLog>> {
        let topic_filter: Vec<String> = topics.iter().map(|t| format!("0x{:x}", t)).collect();
        let filter = json!({
            "address": format!("0x{:x}", address),
            "fromBlock": "0x0",
            "toBlock": format!("0x{:x}", to_block),
            "topics": [topic_filter],
        });

        let result = self.call_rpc("eth_getLogs", json!([filter])).await?;
        let logs: Vec<RpcLog> =
            serde_json::from_value(result).context("Failed to deserialize logs")?;

        let mut parsed = logs
            .into_iter()
            .map(parse_log)
            .collect::<Result<Vec<_>>>()?;
        parsed.sort_by_key(|log| (log.block_number, log.log_index));

        debug!("Fetched {} logs from {} up to block {}", parsed.len(), address, to_block);
        Ok(parsed)
    }

    /// Execute a read-only call against the latest block.
    pub async fn call(&self, to: Address, data: &[u8]) -> Result<Vec<u8>> {
        let request = json!({
            "to": format!("0x{:x}", to),
            "data": format!("0x{}", hex::encode(data)),
        });
        let result = self.call_rpc("eth_call", json!([request, "latest"])).await?;
        let hex_str = result.as_str().context("Invalid eth_call response")?;
        decode_hex(hex_str)
    }
}

fn is_revert(error: &Value) -> bool {
    error.get("code").and_then(Value::as_i64) == Some(3)
        || error
            .get("message")
            .and_then(Value::as_str)
            .is_some_and(|message| message.contains("revert"))
}

fn parse_quantity(s: &str) -> Result<u64> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        anyhow::bail!("Empty quantity");
    }
    u64::from_str_radix(digits, 16).with_context(|| format!("Invalid quantity: {}", s))
}

fn decode_hex(s: &str) -> Result<Vec<u8>> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    // Handle odd-length hex strings by padding with a leading zero
    let digits = if digits.len() % 2 == 1 {
        format!("0{}", digits)
    } else {
        digits.to_string()
    };
    hex::decode(&digits).with_context(|| format!("Invalid hex data: {}", s))
}

fn parse_log(log: RpcLog) -> Result<RawLog> {
    let block_number = log
        .block_number
        .as_deref()
        .context("Log missing blockNumber")
        .and_then(parse_quantity)?;
    let log_index = log
        .log_index
        .as_deref()
        .context("Log missing logIndex")
        .and_then(parse_quantity)?;
    let topics = log
        .topics
        .iter()
        .map(|t| B256::from_str(t).with_context(|| format!("Invalid topic: {}", t)))
        .collect::<Result<Vec<_>>>()?;

    Ok(RawLog {
        block_number,
        log_index,
        topics,
        data: decode_hex(&log.data)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_quantity() {
        assert_eq!(parse_quantity("0x10").unwrap(), 16);
        assert_eq!(parse_quantity("ff").unwrap(), 255);
        assert!(parse_quantity("0x").is_err());
        assert!(parse_quantity("0xzz").is_err());
    }

    #[test]
    fn test_decode_hex_pads_odd_length() {
        assert_eq!(decode_hex("0x1").unwrap(), vec![0x01]);
        assert_eq!(decode_hex("0x").unwrap(), Vec::<u8>::new());
        assert_eq!(decode_hex("0xabcd").unwrap(), vec![0xab, 0xcd]);
    }

    #[test]
    fn test_parse_log() {
        let log: RpcLog = serde_json::from_value(json!({
            "address": "0x41d5d79431a913c4ae7d69a668ecdfe5ff9dfb68",
            "topics": [
                "0xdec2bacdd2f05b59de34da9b523dff8be42e5e38e818c82fdb0bae774387a724",
                "0x00000000000000000000000070997970c51812dc3a010c7d01b50e0d17dc79c8"
            ],
            "data": "0x00",
            "blockNumber": "0x1b4",
            "logIndex": "0x2",
            "removed": false
        }))
        .unwrap();

        let parsed = parse_log(log).unwrap();
        assert_eq!(parsed.block_number, 436);
        assert_eq!(parsed.log_index, 2);
        assert_eq!(parsed.topics.len(), 2);
        assert_eq!(parsed.data, vec![0]);
    }

    #[test]
    fn test_pending_log_is_rejected() {
        let log: RpcLog = serde_json::from_value(json!({
            "topics": [],
            "data": "0x",
            "blockNumber": null,
            "logIndex": null
        }))
        .unwrap();
        assert!(parse_log(log).is_err());
    }

    #[test]
    fn test_revert_detection() {
        assert!(is_revert(&json!({"code": 3, "message": "execution reverted"})));
        assert!(is_revert(&json!({"code": -32000, "message": "execution reverted"})));
        assert!(!is_revert(&json!({"code": -32005, "message": "limit exceeded"})));
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let mut config = RpcConfig::new("http://localhost:8545");
        config.base_delay = Duration::from_millis(100);
        config.max_delay = Duration::from_millis(500);
        let client = RpcClient::new(config, Metrics::new().unwrap()).unwrap();

        assert_eq!(client.backoff(0), Duration::from_millis(100));
        assert_eq!(client.backoff(1), Duration::from_millis(200));
        assert_eq!(client.backoff(2), Duration::from_millis(400));
        assert_eq!(client.backoff(3), Duration::from_millis(500));
        assert_eq!(client.backoff(40), Duration::from_millis(500));
    }
}
