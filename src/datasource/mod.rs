//! Chain data source abstraction for historical contract calls and event logs.

use crate::domain::BlockHeight;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

pub mod abi;
pub mod logs;
pub mod mock;
pub mod rpc;

pub use logs::{LogScan, ScanCursor};
pub use mock::MockChainReader;
pub use rpc::{RpcChainReader, RpcSettings};

/// Historical, read-only view of the chain.
///
/// Every method takes an explicit block height. Implementations must bound
/// retries and time out every request, and must be safe to share across
/// concurrently running extractors.
#[async_trait]
pub trait ChainReader: Send + Sync + fmt::Debug {
    /// Execute a read-only contract call against the state at `block`.
    ///
    /// # Returns
    /// The raw ABI-encoded return data
    async fn call_at(
        &self,
        contract: Address,
        calldata: Bytes,
        block: BlockHeight,
    ) -> Result<Bytes, ChainError>;

    /// Fetch event logs emitted by `filter.address` matching `filter.topic0`
    /// in the inclusive block span `[from, to_inclusive]`.
    ///
    /// Large spans may be rejected with `ChainError::RangeTooLarge`; use
    /// `LogScan` for paginated, restartable scans.
    async fn logs(
        &self,
        filter: &LogFilter,
        from: BlockHeight,
        to_inclusive: BlockHeight,
    ) -> Result<Vec<LogEntry>, ChainError>;

    /// Native coin balance of `account` at `block`.
    async fn balance_at(&self, account: Address, block: BlockHeight) -> Result<U256, ChainError>;

    /// Contract code deployed at `account` at `block` (empty for EOAs).
    async fn code_at(&self, account: Address, block: BlockHeight) -> Result<Bytes, ChainError>;

    /// Transaction receipt, or `None` if the node does not know the hash.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError>;
}

/// Address + event signature filter for log scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LogFilter {
    pub address: Address,
    pub topic0: B256,
}

impl LogFilter {
    pub fn new(address: Address, topic0: B256) -> Self {
        Self { address, topic0 }
    }

    /// Filter for a typed event emitted by `address`.
    pub fn for_event<E: SolEvent>(address: Address) -> Self {
        Self::new(address, E::SIGNATURE_HASH)
    }
}

/// A single raw event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
    pub log_index: u64,
    pub transaction_hash: B256,
}

impl LogEntry {
    pub fn topic0(&self) -> Option<&B256> {
        self.topics.first()
    }

    /// Decode into a typed event.
    pub fn decode<E: SolEvent>(&self) -> Result<E, ChainError> {
        E::decode_raw_log(self.topics.iter().copied(), &self.data).map_err(|e| {
            ChainError::Decode(format!(
                "{} log {}:{} in tx {}: {}",
                E::SIGNATURE,
                self.block_number,
                self.log_index,
                self.transaction_hash,
                e
            ))
        })
    }
}

/// The subset of a transaction receipt the ledger needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: B256,
    pub from: Address,
    pub status: bool,
    pub logs: Vec<LogEntry>,
}

/// Error type for chain data source operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChainError {
    /// Network failure or timeout (retryable)
    #[error("Network error: {0}")]
    Network(String),
    /// Rate limit exceeded (retryable)
    #[error("Rate limited")]
    RateLimited,
    /// HTTP error (5xx retryable, others not)
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },
    /// The node no longer holds (or never had) state for this block
    #[error("Historical state unavailable at block {block}: {message}")]
    StateUnavailable { block: u64, message: String },
    /// The node refused a log query span as too large
    #[error("Log range too large: {0}")]
    RangeTooLarge(String),
    /// The call reverted (method missing at that block, bad arguments)
    #[error("Call reverted: {0}")]
    Reverted(String),
    /// Other JSON-RPC error object
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// Malformed or undecodable response
    #[error("Decode error: {0}")]
    Decode(String),
}

impl ChainError {
    /// Whether the error is worth retrying at the transport boundary.
    pub fn is_transient(&self) -> bool {
        match self {
            ChainError::Network(_) | ChainError::RateLimited => true,
            ChainError::Http { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Execute a typed contract call and decode its return value.
pub async fn call_typed<C>(
    reader: &dyn ChainReader,
    contract: Address,
    call: &C,
    block: BlockHeight,
) -> Result<C::Return, ChainError>
where
    C: SolCall + Sync,
{
    let data = reader
        .call_at(contract, Bytes::from(call.abi_encode()), block)
        .await?;
    decode_returns::<C>(&data, contract, block)
}

/// Like [`call_typed`], but `None` when the call returns no data, which is
/// what a node answers for an address without code at `block`.
pub async fn call_typed_if_deployed<C>(
    reader: &dyn ChainReader,
    contract: Address,
    call: &C,
    block: BlockHeight,
) -> Result<Option<C::Return>, ChainError>
where
    C: SolCall + Sync,
{
    let data = reader
        .call_at(contract, Bytes::from(call.abi_encode()), block)
        .await?;
    if data.is_empty() {
        return Ok(None);
    }
    decode_returns::<C>(&data, contract, block).map(Some)
}

fn decode_returns<C: SolCall>(
    data: &[u8],
    contract: Address,
    block: BlockHeight,
) -> Result<C::Return, ChainError> {
    C::abi_decode_returns(data).map_err(|e| {
        ChainError::Decode(format!(
            "{} on {} at block {}: {}",
            C::SIGNATURE,
            contract,
            block,
            e
        ))
    })
}
