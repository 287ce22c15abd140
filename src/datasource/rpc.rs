//! JSON-RPC chain reader implementation.

use super::{ChainError, ChainReader, LogEntry, LogFilter, TxReceipt};
use crate::domain::BlockHeight;
use alloy_primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use backoff::future::retry;
use backoff::ExponentialBackoff;
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Transport settings for the JSON-RPC reader.
#[derive(Debug, Clone)]
pub struct RpcSettings {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Attempts per request, including the first one.
    pub max_attempts: u32,
    /// Requests allowed in flight at once across all extractors.
    pub max_in_flight: usize,
    /// First retry delay; later delays grow exponentially.
    pub initial_backoff: Duration,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            max_in_flight: 8,
            initial_backoff: Duration::from_millis(250),
        }
    }
}

/// Chain reader speaking Ethereum JSON-RPC over HTTP.
#[derive(Debug, Clone)]
pub struct RpcChainReader {
    client: Client,
    url: String,
    max_attempts: u32,
    initial_backoff: Duration,
    in_flight: Arc<Semaphore>,
    next_id: Arc<AtomicU64>,
}

impl RpcChainReader {
    /// Create a new reader for `url`.
    pub fn new(url: String, settings: RpcSettings) -> Result<Self, ChainError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ChainError::Network(e.to_string()))?;

        Ok(Self {
            client,
            url,
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff,
            in_flight: Arc::new(Semaphore::new(settings.max_in_flight.max(1))),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    async fn request(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let backoff = ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_elapsed_time: Some(Duration::from_secs(120)),
            ..Default::default()
        };
        let attempt = AtomicU32::new(0);

        retry(backoff, || async {
            let n = attempt.fetch_add(1, Ordering::SeqCst) + 1;
            self.send_once(method, &params).await.map_err(|e| {
                let decision = retry_decision(e, n, self.max_attempts);
                if let backoff::Error::Transient { err, .. } = &decision {
                    warn!("{} attempt {}/{} failed: {}", method, n, self.max_attempts, err);
                }
                decision
            })
        })
        .await
    }

    async fn send_once(
        &self,
        method: &str,
        params: &serde_json::Value,
    ) -> Result<serde_json::Value, ChainError> {
        let _permit = self
            .in_flight
            .acquire()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        let payload = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id.fetch_add(1, Ordering::Relaxed),
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChainError::Network(e.to_string()))?;

        let status = response.status();
        if status == 429 {
            return Err(ChainError::RateLimited);
        }
        if !status.is_success() {
            return Err(ChainError::Http {
                status: status.as_u16(),
                message: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }

        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ChainError::Decode(e.to_string()))?;

        if let Some(error) = body.get("error") {
            let code = error.get("code").and_then(|v| v.as_i64()).unwrap_or(0);
            let message = error
                .get("message")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error")
                .to_string();
            return Err(classify_rpc_error(code, message, block_of(params)));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| ChainError::Decode("Missing result field".to_string()))
    }
}

#[async_trait]
impl ChainReader for RpcChainReader {
    async fn call_at(
        &self,
        contract: Address,
        calldata: Bytes,
        block: BlockHeight,
    ) -> Result<Bytes, ChainError> {
        let params = serde_json::json!([
            {
                "to": contract.to_string(),
                "data": format!("0x{}", hex::encode(&calldata)),
            },
            block.to_rpc_tag(),
        ]);
        let result = self.request("eth_call", params).await?;
        parse_bytes(&result)
    }

    async fn logs(
        &self,
        filter: &LogFilter,
        from: BlockHeight,
        to_inclusive: BlockHeight,
    ) -> Result<Vec<LogEntry>, ChainError> {
        debug!(
            "Fetching logs address={}, topic0={}, from={}, to={}",
            filter.address, filter.topic0, from, to_inclusive
        );

        let params = serde_json::json!([{
            "address": filter.address.to_string(),
            "topics": [filter.topic0.to_string()],
            "fromBlock": from.to_rpc_tag(),
            "toBlock": to_inclusive.to_rpc_tag(),
        }]);
        let result = self.request("eth_getLogs", params).await?;

        let logs_json = result
            .as_array()
            .ok_or_else(|| ChainError::Decode("Expected array response".to_string()))?;
        logs_json.iter().map(parse_log).collect()
    }

    async fn balance_at(&self, account: Address, block: BlockHeight) -> Result<U256, ChainError> {
        let params = serde_json::json!([account.to_string(), block.to_rpc_tag()]);
        let result = self.request("eth_getBalance", params).await?;
        let quantity = result
            .as_str()
            .ok_or_else(|| ChainError::Decode("Expected hex quantity".to_string()))?;
        parse_u256_quantity(quantity)
    }

    async fn code_at(&self, account: Address, block: BlockHeight) -> Result<Bytes, ChainError> {
        let params = serde_json::json!([account.to_string(), block.to_rpc_tag()]);
        let result = self.request("eth_getCode", params).await?;
        parse_bytes(&result)
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        let params = serde_json::json!([tx_hash.to_string()]);
        let result = self.request("eth_getTransactionReceipt", params).await?;
        if result.is_null() {
            return Ok(None);
        }
        parse_receipt(&result).map(Some)
    }
}

/// Transient errors are retried until attempt `max_attempts`; everything
/// else surfaces on the first failure.
fn retry_decision(
    error: ChainError,
    attempt: u32,
    max_attempts: u32,
) -> backoff::Error<ChainError> {
    if error.is_transient() && attempt < max_attempts {
        backoff::Error::transient(error)
    } else {
        backoff::Error::permanent(error)
    }
}

/// Map a JSON-RPC error object onto the chain error taxonomy.
///
/// Node implementations disagree on codes, so the message text decides
/// between pruned state, oversized log ranges and reverts.
fn classify_rpc_error(code: i64, message: String, block: Option<u64>) -> ChainError {
    let lower = message.to_ascii_lowercase();

    if code == -32005 || lower.contains("rate limit") || lower.contains("too many requests") {
        return ChainError::RateLimited;
    }
    if lower.contains("missing trie node")
        || lower.contains("header not found")
        || lower.contains("pruned")
        || lower.contains("state is not available")
        || lower.contains("historical state")
    {
        return ChainError::StateUnavailable {
            block: block.unwrap_or_default(),
            message,
        };
    }
    if lower.contains("query returned more than")
        || lower.contains("block range")
        || lower.contains("range is too large")
        || lower.contains("response size")
        || lower.contains("log response")
    {
        return ChainError::RangeTooLarge(message);
    }
    if code == 3 || lower.contains("execution reverted") || lower.contains("revert") {
        return ChainError::Reverted(message);
    }
    ChainError::Rpc { code, message }
}

/// Block tag carried in request params, for error context.
fn block_of(params: &serde_json::Value) -> Option<u64> {
    params
        .as_array()
        .and_then(|items| items.last())
        .and_then(|v| v.as_str())
        .and_then(|s| parse_u64_quantity(s).ok())
}

fn parse_u64_quantity(s: &str) -> Result<u64, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("Invalid quantity {}: {}", s, e)))
}

fn parse_u256_quantity(s: &str) -> Result<U256, ChainError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    if digits.is_empty() {
        return Ok(U256::ZERO);
    }
    U256::from_str_radix(digits, 16)
        .map_err(|e| ChainError::Decode(format!("Invalid quantity {}: {}", s, e)))
}

fn parse_bytes(value: &serde_json::Value) -> Result<Bytes, ChainError> {
    let s = value
        .as_str()
        .ok_or_else(|| ChainError::Decode("Expected hex data".to_string()))?;
    let digits = s.strip_prefix("0x").unwrap_or(s);
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| ChainError::Decode(format!("Invalid hex data: {}", e)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLog {
    address: Address,
    topics: Vec<B256>,
    data: Bytes,
    block_number: String,
    log_index: String,
    transaction_hash: B256,
}

fn parse_log(log_json: &serde_json::Value) -> Result<LogEntry, ChainError> {
    let raw: RawLog = serde_json::from_value(log_json.clone())
        .map_err(|e| ChainError::Decode(format!("Invalid log: {}", e)))?;

    Ok(LogEntry {
        address: raw.address,
        topics: raw.topics,
        data: raw.data,
        block_number: parse_u64_quantity(&raw.block_number)?,
        log_index: parse_u64_quantity(&raw.log_index)?,
        transaction_hash: raw.transaction_hash,
    })
}

fn parse_receipt(receipt_json: &serde_json::Value) -> Result<TxReceipt, ChainError> {
    let transaction_hash = receipt_json
        .get("transactionHash")
        .cloned()
        .ok_or_else(|| ChainError::Decode("Missing transactionHash field".to_string()))
        .and_then(|v| {
            serde_json::from_value::<B256>(v).map_err(|e| ChainError::Decode(e.to_string()))
        })?;

    let from = receipt_json
        .get("from")
        .cloned()
        .ok_or_else(|| ChainError::Decode("Missing from field".to_string()))
        .and_then(|v| {
            serde_json::from_value::<Address>(v).map_err(|e| ChainError::Decode(e.to_string()))
        })?;

    // Pre-Byzantium receipts carry a state root instead of a status.
    let status = match receipt_json.get("status").and_then(|v| v.as_str()) {
        Some(s) => parse_u64_quantity(s)? == 1,
        None => true,
    };

    let logs = receipt_json
        .get("logs")
        .and_then(|v| v.as_array())
        .ok_or_else(|| ChainError::Decode("Missing logs field".to_string()))?
        .iter()
        .map(parse_log)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(TxReceipt {
        transaction_hash,
        from,
        status,
        logs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP node answering every request with `status` and `body`.
    /// Connections are closed after each response, so accepted connections
    /// count requests.
    async fn stub_node(status: u16, body: &'static str) -> (String, Arc<AtomicU32>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let hits = Arc::new(AtomicU32::new(0));
        let counter = hits.clone();

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 16 * 1024];
                    let mut read = 0;
                    while read < buf.len() {
                        let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        let Some(end) = buf[..read].windows(4).position(|w| w == b"\r\n\r\n")
                        else {
                            continue;
                        };
                        let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
                        let length = headers
                            .lines()
                            .find_map(|l| l.strip_prefix("content-length:"))
                            .and_then(|v| v.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        if read >= end + 4 + length {
                            break;
                        }
                    }
                    let response = format!(
                        "HTTP/1.1 {} Stub\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        (url, hits)
    }

    fn reader_for(url: String, max_attempts: u32) -> RpcChainReader {
        RpcChainReader::new(
            url,
            RpcSettings {
                timeout: Duration::from_secs(5),
                max_attempts,
                max_in_flight: 1,
                initial_backoff: Duration::from_millis(1),
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_rate_limited_request_retried_then_propagated() {
        let (url, hits) = stub_node(429, "").await;
        let reader = reader_for(url, 3);

        let result = reader
            .balance_at(Address::ZERO, BlockHeight::new(5))
            .await;

        assert_eq!(result, Err(ChainError::RateLimited));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_pruned_state_not_retried() {
        let (url, hits) = stub_node(
            200,
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"missing trie node 0xabc"}}"#,
        )
        .await;
        let reader = reader_for(url, 3);

        let result = reader.code_at(Address::ZERO, BlockHeight::new(5)).await;

        assert!(matches!(
            result,
            Err(ChainError::StateUnavailable { block: 5, .. })
        ));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_successful_request_sent_once() {
        let (url, hits) = stub_node(200, r#"{"jsonrpc":"2.0","id":1,"result":"0x2a"}"#).await;
        let reader = reader_for(url, 3);

        let balance = reader
            .balance_at(Address::ZERO, BlockHeight::new(5))
            .await
            .unwrap();

        assert_eq!(balance, U256::from(42u64));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_retry_decision() {
        assert!(matches!(
            retry_decision(ChainError::RateLimited, 1, 3),
            backoff::Error::Transient { .. }
        ));
        assert!(matches!(
            retry_decision(ChainError::RateLimited, 3, 3),
            backoff::Error::Permanent(ChainError::RateLimited)
        ));
        assert!(matches!(
            retry_decision(ChainError::Reverted("boom".to_string()), 1, 3),
            backoff::Error::Permanent(ChainError::Reverted(_))
        ));
    }

    #[test]
    fn test_classify_pruned_state() {
        let err = classify_rpc_error(-32000, "missing trie node abc".to_string(), Some(42));
        assert_eq!(
            err,
            ChainError::StateUnavailable {
                block: 42,
                message: "missing trie node abc".to_string()
            }
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_rate_limit_and_range() {
        assert_eq!(
            classify_rpc_error(-32005, "limit".to_string(), None),
            ChainError::RateLimited
        );
        assert!(matches!(
            classify_rpc_error(-32602, "query returned more than 10000 results".to_string(), None),
            ChainError::RangeTooLarge(_)
        ));
        assert!(matches!(
            classify_rpc_error(3, "execution reverted".to_string(), None),
            ChainError::Reverted(_)
        ));
        assert!(matches!(
            classify_rpc_error(-32601, "method not found".to_string(), None),
            ChainError::Rpc { code: -32601, .. }
        ));
    }

    #[test]
    fn test_block_of_params() {
        let params = serde_json::json!([{"to": "0x0"}, "0x10"]);
        assert_eq!(block_of(&params), Some(16));
        assert_eq!(block_of(&serde_json::json!([])), None);
    }

    #[test]
    fn test_parse_quantities() {
        assert_eq!(parse_u64_quantity("0x1a").unwrap(), 26);
        assert_eq!(parse_u256_quantity("0x").unwrap(), U256::ZERO);
        assert_eq!(
            parse_u256_quantity("0xde0b6b3a7640000").unwrap(),
            U256::from(1_000_000_000_000_000_000u64)
        );
        assert!(parse_u64_quantity("0xzz").is_err());
    }

    #[test]
    fn test_parse_log_valid() {
        let log_json = serde_json::json!({
            "address": "0x2a8e1e676ec238d8a992307b495b45b3feaa5e86",
            "topics": ["0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822"],
            "data": "0x0001",
            "blockNumber": "0xabc",
            "logIndex": "0x3",
            "transactionHash": "0x1111111111111111111111111111111111111111111111111111111111111111",
            "removed": false
        });

        let log = parse_log(&log_json).unwrap();
        assert_eq!(
            log.address,
            address!("0x2a8e1e676ec238d8a992307b495b45b3feaa5e86")
        );
        assert_eq!(log.block_number, 0xabc);
        assert_eq!(log.log_index, 3);
        assert_eq!(log.data, Bytes::from(vec![0u8, 1u8]));
        assert_eq!(log.transaction_hash, B256::repeat_byte(0x11));
    }

    #[test]
    fn test_parse_receipt_failed_status() {
        let receipt_json = serde_json::json!({
            "transactionHash": "0x2222222222222222222222222222222222222222222222222222222222222222",
            "from": "0x0000000000000000000000000000000000000011",
            "status": "0x0",
            "logs": []
        });

        let receipt = parse_receipt(&receipt_json).unwrap();
        assert!(!receipt.status);
        assert_eq!(
            receipt.from,
            address!("0x0000000000000000000000000000000000000011")
        );
        assert!(receipt.logs.is_empty());
    }
}
