//! Mock chain reader for testing without network calls.

use super::{ChainError, ChainReader, LogEntry, LogFilter, TxReceipt};
use crate::domain::BlockHeight;
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{SolCall, SolEvent, SolValue};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type CallKey = (Address, Vec<u8>);

/// Mock chain reader that answers from predefined state.
///
/// Calls are keyed by (contract, calldata) and optionally by block; a
/// block-specific answer takes precedence over an any-block answer.
#[derive(Debug, Clone, Default)]
pub struct MockChainReader {
    calls_at_block: HashMap<(Address, Vec<u8>, u64), Result<Bytes, ChainError>>,
    calls_any_block: HashMap<CallKey, Result<Bytes, ChainError>>,
    logs: Vec<LogEntry>,
    balances: HashMap<(Address, u64), U256>,
    code: HashMap<Address, Bytes>,
    receipts: HashMap<B256, TxReceipt>,
    max_log_span: Option<u64>,
    call_count: Arc<AtomicUsize>,
    log_queries: Arc<AtomicUsize>,
}

impl MockChainReader {
    /// Create a new mock chain reader with empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `call` on `contract` at exactly `block`.
    pub fn with_call<C: SolCall, R: SolValue>(
        mut self,
        contract: Address,
        call: C,
        block: u64,
        ret: R,
    ) -> Self
    where
        for<'a> <R::SolType as alloy_sol_types::SolType>::Token<'a>: alloy_sol_types::abi::TokenSeq<'a>,
    {
        self.calls_at_block.insert(
            (contract, call.abi_encode(), block),
            Ok(Bytes::from(ret.abi_encode_params())),
        );
        self
    }

    /// Answer `call` on `contract` at any block.
    pub fn with_call_any_block<C: SolCall, R: SolValue>(
        mut self,
        contract: Address,
        call: C,
        ret: R,
    ) -> Self
    where
        for<'a> <R::SolType as alloy_sol_types::SolType>::Token<'a>: alloy_sol_types::abi::TokenSeq<'a>,
    {
        self.calls_any_block.insert(
            (contract, call.abi_encode()),
            Ok(Bytes::from(ret.abi_encode_params())),
        );
        self
    }

    /// Answer `call` on `contract` with raw return bytes at any block.
    pub fn with_raw_call<C: SolCall>(mut self, contract: Address, call: C, data: Bytes) -> Self {
        self.calls_any_block
            .insert((contract, call.abi_encode()), Ok(data));
        self
    }

    /// Fail `call` on `contract` at any block.
    pub fn with_failing_call<C: SolCall>(
        mut self,
        contract: Address,
        call: C,
        error: ChainError,
    ) -> Self {
        self.calls_any_block
            .insert((contract, call.abi_encode()), Err(error));
        self
    }

    /// Add a log entry.
    pub fn with_log(mut self, log: LogEntry) -> Self {
        self.logs.push(log);
        self
    }

    /// Add multiple log entries.
    pub fn with_logs(mut self, logs: Vec<LogEntry>) -> Self {
        self.logs.extend(logs);
        self
    }

    /// Set the native balance of `account` at `block`.
    pub fn with_balance(mut self, account: Address, block: u64, balance: U256) -> Self {
        self.balances.insert((account, block), balance);
        self
    }

    /// Mark `account` as a contract.
    pub fn with_code(mut self, account: Address, code: Bytes) -> Self {
        self.code.insert(account, code);
        self
    }

    /// Add a transaction receipt.
    pub fn with_receipt(mut self, receipt: TxReceipt) -> Self {
        self.receipts.insert(receipt.transaction_hash, receipt);
        self
    }

    /// Reject log queries spanning more than `blocks` blocks.
    pub fn with_max_log_span(mut self, blocks: u64) -> Self {
        self.max_log_span = Some(blocks);
        self
    }

    /// Number of `call_at` invocations served so far.
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of `logs` invocations served so far.
    pub fn log_query_count(&self) -> usize {
        self.log_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainReader for MockChainReader {
    async fn call_at(
        &self,
        contract: Address,
        calldata: Bytes,
        block: BlockHeight,
    ) -> Result<Bytes, ChainError> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        let data = calldata.to_vec();

        if let Some(answer) = self
            .calls_at_block
            .get(&(contract, data.clone(), block.as_u64()))
        {
            return answer.clone();
        }
        if let Some(answer) = self.calls_any_block.get(&(contract, data)) {
            return answer.clone();
        }
        Err(ChainError::Reverted(format!(
            "no mocked call on {} at block {}",
            contract, block
        )))
    }

    async fn logs(
        &self,
        filter: &LogFilter,
        from: BlockHeight,
        to_inclusive: BlockHeight,
    ) -> Result<Vec<LogEntry>, ChainError> {
        self.log_queries.fetch_add(1, Ordering::SeqCst);

        if let Some(max_span) = self.max_log_span {
            let span = to_inclusive.as_u64().saturating_sub(from.as_u64()) + 1;
            if span > max_span {
                return Err(ChainError::RangeTooLarge(format!(
                    "span {} exceeds {}",
                    span, max_span
                )));
            }
        }

        Ok(self
            .logs
            .iter()
            .filter(|l| {
                l.address == filter.address
                    && l.topic0() == Some(&filter.topic0)
                    && l.block_number >= from.as_u64()
                    && l.block_number <= to_inclusive.as_u64()
            })
            .cloned()
            .collect())
    }

    async fn balance_at(&self, account: Address, block: BlockHeight) -> Result<U256, ChainError> {
        Ok(self
            .balances
            .get(&(account, block.as_u64()))
            .copied()
            .unwrap_or(U256::ZERO))
    }

    async fn code_at(&self, account: Address, _block: BlockHeight) -> Result<Bytes, ChainError> {
        Ok(self.code.get(&account).cloned().unwrap_or_default())
    }

    async fn receipt(&self, tx_hash: B256) -> Result<Option<TxReceipt>, ChainError> {
        Ok(self.receipts.get(&tx_hash).cloned())
    }
}

/// Build a raw log entry from a typed event.
pub fn log_from_event<E: SolEvent>(
    address: Address,
    event: &E,
    block_number: u64,
    log_index: u64,
    transaction_hash: B256,
) -> LogEntry {
    let data = event.encode_log_data();
    LogEntry {
        address,
        topics: data.topics().to_vec(),
        data: data.data.clone(),
        block_number,
        log_index,
        transaction_hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::abi::{IERC20, IGeyser};
    use crate::datasource::call_typed;
    use alloy_primitives::address;

    const TOKEN: Address = address!("0x2a8e1e676ec238d8a992307b495b45b3feaa5e86");
    const HOLDER: Address = address!("0x00000000000000000000000000000000000000aa");

    #[tokio::test]
    async fn test_mock_call_block_specific_wins() {
        let mock = MockChainReader::new()
            .with_call_any_block(TOKEN, IERC20::balanceOfCall { owner: HOLDER }, U256::from(1u64))
            .with_call(
                TOKEN,
                IERC20::balanceOfCall { owner: HOLDER },
                10,
                U256::from(7u64),
            );

        let at_10 = call_typed(
            &mock,
            TOKEN,
            &IERC20::balanceOfCall { owner: HOLDER },
            BlockHeight::new(10),
        )
        .await
        .unwrap();
        let at_11 = call_typed(
            &mock,
            TOKEN,
            &IERC20::balanceOfCall { owner: HOLDER },
            BlockHeight::new(11),
        )
        .await
        .unwrap();

        assert_eq!(at_10, U256::from(7u64));
        assert_eq!(at_11, U256::from(1u64));
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_mock_unknown_call_reverts() {
        let mock = MockChainReader::new();
        let result = call_typed(
            &mock,
            TOKEN,
            &IERC20::totalSupplyCall {},
            BlockHeight::new(1),
        )
        .await;
        assert!(matches!(result, Err(ChainError::Reverted(_))));
    }

    #[tokio::test]
    async fn test_mock_logs_filtered_by_range_and_topic() {
        let staked = IGeyser::Staked {
            user: HOLDER,
            amount: U256::from(5u64),
        };
        let mock = MockChainReader::new()
            .with_log(log_from_event(TOKEN, &staked, 10, 0, B256::repeat_byte(1)))
            .with_log(log_from_event(TOKEN, &staked, 20, 0, B256::repeat_byte(2)));

        let filter = LogFilter::for_event::<IGeyser::Staked>(TOKEN);
        let logs = mock
            .logs(&filter, BlockHeight::new(0), BlockHeight::new(15))
            .await
            .unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].block_number, 10);

        let other = LogFilter::for_event::<IERC20::Transfer>(TOKEN);
        let none = mock
            .logs(&other, BlockHeight::new(0), BlockHeight::new(30))
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_mock_rejects_wide_log_span() {
        let mock = MockChainReader::new().with_max_log_span(10);
        let filter = LogFilter::new(TOKEN, B256::ZERO);
        let result = mock
            .logs(&filter, BlockHeight::new(0), BlockHeight::new(10))
            .await;
        assert!(matches!(result, Err(ChainError::RangeTooLarge(_))));
    }
}
