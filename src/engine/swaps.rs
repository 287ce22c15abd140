//! Swap ledger reconstruction from pool event logs.
//!
//! Each decoded log is netted per leg: the tracked token flowing into the
//! pool is a sell, flowing out is a buy. Transaction receipts supply the
//! trader (`from`) and the final recipient (`to` of the last swap in the
//! transaction).

use crate::datasource::abi::{IMooniswap, IUniswapV2Pair};
use crate::datasource::{ChainReader, LogEntry, LogFilter, LogScan, TxReceipt};
use crate::domain::{
    sort_swaps_deterministic, BlockHeight, BlockRange, CorrectionFactor, Direction, Market,
    Provenance, Route, SwapEvent, VenueKind,
};
use crate::engine::OverrideTable;
use crate::error::{ChainContext, RunError};
use crate::output::checkpoint::{CheckpointStore, LedgerCheckpoint};
use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::SolEvent;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};

/// Pool-relative leg amounts of one swap log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Legs {
    amount0_in: U256,
    amount1_in: U256,
    amount0_out: U256,
    amount1_out: U256,
    recipient: Address,
}

fn swap_topic(market: &Market) -> B256 {
    match market.venue.kind() {
        VenueKind::MultiPool => IMooniswap::Swapped::SIGNATURE_HASH,
        _ => IUniswapV2Pair::Swap::SIGNATURE_HASH,
    }
}

fn decode_legs(market: &Market, entry: &LogEntry) -> Result<Legs, RunError> {
    match market.venue.kind() {
        VenueKind::MultiPool => {
            let swapped: IMooniswap::Swapped = entry
                .decode()
                .in_unit(|| format!("{} log decode", market.label()))?;
            let (amount0_in, amount1_in, amount0_out, amount1_out) =
                if swapped.src == market.token0 && swapped.dst == market.token1 {
                    (swapped.amount, U256::ZERO, U256::ZERO, swapped.result)
                } else if swapped.src == market.token1 && swapped.dst == market.token0 {
                    (U256::ZERO, swapped.amount, swapped.result, U256::ZERO)
                } else {
                    return Err(RunError::DataConsistency(format!(
                        "{} tx {}: swap {} -> {} does not match pool tokens",
                        market.label(),
                        entry.transaction_hash,
                        swapped.src,
                        swapped.dst
                    )));
                };
            Ok(Legs {
                amount0_in,
                amount1_in,
                amount0_out,
                amount1_out,
                recipient: swapped.account,
            })
        }
        _ => {
            let swap: IUniswapV2Pair::Swap = entry
                .decode()
                .in_unit(|| format!("{} log decode", market.label()))?;
            Ok(Legs {
                amount0_in: swap.amount0In,
                amount1_in: swap.amount1In,
                amount0_out: swap.amount0Out,
                amount1_out: swap.amount1Out,
                recipient: swap.to,
            })
        }
    }
}

/// Where the tracked token sits in the transaction's swap chain.
///
/// `In` needs the first hop selling the tracked token, `Out` the last hop
/// buying it. Every other position is `Through`.
fn route_of(log_index: u64, direction: Direction, swap_indices: &[u64]) -> Route {
    let (Some(first), Some(last)) = (swap_indices.first(), swap_indices.last()) else {
        return Route::Unknown;
    };
    if !swap_indices.contains(&log_index) {
        return Route::Unknown;
    }
    match direction {
        Direction::Sell if log_index == *first => Route::In,
        Direction::Buy if log_index == *last => Route::Out,
        _ => Route::Through,
    }
}

/// Extracts the swap ledger of one market over a half-open block range.
#[derive(Debug, Clone)]
pub struct SwapLedgerExtractor {
    reader: Arc<dyn ChainReader>,
    tracked_token: Address,
    factor: CorrectionFactor,
    page_blocks: u64,
    overrides: Arc<OverrideTable>,
    checkpoints: Option<CheckpointStore>,
}

impl SwapLedgerExtractor {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        tracked_token: Address,
        factor: CorrectionFactor,
        page_blocks: u64,
        overrides: Arc<OverrideTable>,
    ) -> Self {
        Self {
            reader,
            tracked_token,
            factor,
            page_blocks,
            overrides,
            checkpoints: None,
        }
    }

    /// Persist scan progress after every page.
    pub fn with_checkpoints(mut self, store: CheckpointStore) -> Self {
        self.checkpoints = Some(store);
        self
    }

    pub async fn extract(
        &self,
        market: &Market,
        range: BlockRange,
    ) -> Result<Vec<SwapEvent>, RunError> {
        let token0_is_tracked = market.token0_is(&self.tracked_token).ok_or_else(|| {
            RunError::Configuration(format!(
                "market {} does not trade {}",
                market.label(),
                self.tracked_token
            ))
        })?;
        info!(market = %market.label(), %range, "Extracting swaps");

        let filter = LogFilter::new(market.pool, swap_topic(market));
        let resumed = match &self.checkpoints {
            Some(store) => store.load(market, &range)?,
            None => None,
        };
        let (mut scan, mut events) = match resumed {
            Some(checkpoint) => {
                info!(
                    market = %market.label(),
                    next_block = checkpoint.cursor.next_block,
                    rows = checkpoint.events.len(),
                    "Resuming swap scan"
                );
                (
                    LogScan::resume(
                        self.reader.as_ref(),
                        filter,
                        range,
                        self.page_blocks,
                        checkpoint.cursor,
                    ),
                    checkpoint.events,
                )
            }
            None => (
                LogScan::new(self.reader.as_ref(), filter, range, self.page_blocks),
                Vec::new(),
            ),
        };

        let mut receipts: HashMap<B256, TxReceipt> = HashMap::new();
        while let Some(page) = scan
            .next_page()
            .await
            .in_unit(|| format!("{} logs {}", market.label(), range))?
        {
            for entry in page {
                if self.overrides.covers(&market.pool, &entry.transaction_hash) {
                    debug!(tx = %entry.transaction_hash, "Skipping overridden swap log");
                    continue;
                }
                if let Some(event) = self
                    .decode_event(market, token0_is_tracked, &entry, &mut receipts)
                    .await?
                {
                    events.push(event);
                }
            }

            if let Some(store) = &self.checkpoints {
                store.save(&LedgerCheckpoint {
                    market: *market,
                    range_from: range.from().as_u64(),
                    range_to_exclusive: range.to_exclusive().as_u64(),
                    cursor: scan.cursor(),
                    events: events.clone(),
                })?;
            }
        }

        for record in self.overrides.for_market(market, &range) {
            events.push(record.to_event(market, self.tracked_token, &self.factor)?);
        }

        self.verify(market, &events)?;
        sort_swaps_deterministic(&mut events);
        info!(market = %market.label(), rows = events.len(), "Swaps extracted");
        Ok(events)
    }

    /// Decode one log; `None` for logs of failed transactions.
    async fn decode_event(
        &self,
        market: &Market,
        token0_is_tracked: bool,
        entry: &LogEntry,
        receipts: &mut HashMap<B256, TxReceipt>,
    ) -> Result<Option<SwapEvent>, RunError> {
        let legs = decode_legs(market, entry)?;
        let receipt = self.receipt(market, entry.transaction_hash, receipts).await?;
        if !receipt.status {
            debug!(tx = %entry.transaction_hash, "Skipping failed transaction");
            return Ok(None);
        }

        let topic = swap_topic(market);
        let swap_logs: Vec<&LogEntry> = receipt
            .logs
            .iter()
            .filter(|l| l.topic0() == Some(&topic))
            .collect();
        let swap_indices: Vec<u64> = swap_logs.iter().map(|l| l.log_index).collect();
        let out_address = match swap_logs.last() {
            Some(last) => {
                let last_market = Market {
                    pool: last.address,
                    ..*market
                };
                match decode_legs(&last_market, last) {
                    Ok(last_legs) => last_legs.recipient,
                    Err(e) => {
                        debug!(
                            tx = %entry.transaction_hash,
                            pool = %last.address,
                            error = %e,
                            "Last hop not decodable, using this swap's recipient"
                        );
                        legs.recipient
                    }
                }
            }
            None => legs.recipient,
        };

        let (tracked_in, tracked_out, other_in, other_out) = if token0_is_tracked {
            (legs.amount0_in, legs.amount0_out, legs.amount1_in, legs.amount1_out)
        } else {
            (legs.amount1_in, legs.amount1_out, legs.amount0_in, legs.amount0_out)
        };
        let other_token = if token0_is_tracked {
            market.token1
        } else {
            market.token0
        };

        let (direction, tracked_amount, other_amount, token_in, token_out) =
            if tracked_in > tracked_out {
                (
                    Direction::Sell,
                    tracked_in - tracked_out,
                    other_out.saturating_sub(other_in),
                    self.tracked_token,
                    other_token,
                )
            } else if tracked_out > tracked_in {
                (
                    Direction::Buy,
                    tracked_out - tracked_in,
                    other_in.saturating_sub(other_out),
                    other_token,
                    self.tracked_token,
                )
            } else {
                return Err(RunError::DataConsistency(format!(
                    "{} tx {} log {}: swap moves no net {}",
                    market.label(),
                    entry.transaction_hash,
                    entry.log_index,
                    self.tracked_token
                )));
            };

        let corrected = self
            .factor
            .apply(tracked_amount)
            .map_err(|e| RunError::DataConsistency(e.to_string()))?;
        let (token0_amount, token1_amount) = if token0_is_tracked {
            (corrected, other_amount)
        } else {
            (other_amount, corrected)
        };

        Ok(Some(SwapEvent {
            market: *market,
            block: BlockHeight::new(entry.block_number),
            log_index: entry.log_index,
            tx_hash: entry.transaction_hash,
            in_address: receipt.from,
            out_address,
            direction,
            token0_amount,
            token1_amount,
            tracked_amount_raw: tracked_amount,
            token_in,
            token_out,
            token0_is_tracked,
            route: route_of(entry.log_index, direction, &swap_indices),
            provenance: Provenance::Decoded,
        }))
    }

    async fn receipt<'r>(
        &self,
        market: &Market,
        tx_hash: B256,
        cache: &'r mut HashMap<B256, TxReceipt>,
    ) -> Result<&'r TxReceipt, RunError> {
        if !cache.contains_key(&tx_hash) {
            let receipt = self
                .reader
                .receipt(tx_hash)
                .await
                .in_unit(|| format!("{} receipt {}", market.label(), tx_hash))?
                .ok_or_else(|| {
                    RunError::DataConsistency(format!(
                        "{}: node has a swap log but no receipt for tx {}",
                        market.label(),
                        tx_hash
                    ))
                })?;
            cache.insert(tx_hash, receipt);
        }
        cache.get(&tx_hash).ok_or_else(|| {
            RunError::DataConsistency(format!("receipt cache lost tx {}", tx_hash))
        })
    }

    fn verify(&self, market: &Market, events: &[SwapEvent]) -> Result<(), RunError> {
        let mut seen = HashSet::with_capacity(events.len());
        for event in events {
            if !seen.insert(event.tx_hash) {
                return Err(RunError::DataConsistency(format!(
                    "{}: tx {} appears more than once",
                    market.label(),
                    event.tx_hash
                )));
            }
            if !event.has_single_tracked_leg() {
                return Err(RunError::DataConsistency(format!(
                    "{}: tx {} has no single {} leg",
                    market.label(),
                    event.tx_hash,
                    self.tracked_token
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::log_from_event;
    use crate::datasource::MockChainReader;
    use crate::domain::Venue;
    use crate::engine::SwapOverride;
    use alloy_primitives::address;
    use tempfile::TempDir;

    const OUSD: Address = address!("0x2a8e1e676ec238d8a992307b495b45b3feaa5e86");
    const USDT: Address = address!("0xdac17f958d2ee523a2206206994597c13d831ec7");
    const WETH: Address = address!("0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2");
    const PAIR: Address = address!("0x00000000000000000000000000000000000000a1");
    const HOP: Address = address!("0x00000000000000000000000000000000000000a2");
    const ROUTER: Address = address!("0x00000000000000000000000000000000000000f0");
    const TRADER: Address = address!("0x000000000000000000000000000000000000a11c");

    fn market() -> Market {
        Market {
            venue: Venue::Uniswap,
            pool: PAIR,
            token0: OUSD,
            token1: USDT,
        }
    }

    fn half() -> CorrectionFactor {
        CorrectionFactor::new(U256::from(1u64), U256::from(2u64)).unwrap()
    }

    fn swap_log(
        pool: Address,
        amounts: (u64, u64, u64, u64),
        to: Address,
        block: u64,
        log_index: u64,
        tx: B256,
    ) -> LogEntry {
        let event = IUniswapV2Pair::Swap {
            sender: ROUTER,
            amount0In: U256::from(amounts.0),
            amount1In: U256::from(amounts.1),
            amount0Out: U256::from(amounts.2),
            amount1Out: U256::from(amounts.3),
            to,
        };
        log_from_event(pool, &event, block, log_index, tx)
    }

    fn receipt(tx: B256, status: bool, logs: Vec<LogEntry>) -> TxReceipt {
        TxReceipt {
            transaction_hash: tx,
            from: TRADER,
            status,
            logs,
        }
    }

    fn range(from: u64, to: u64) -> BlockRange {
        BlockRange::new(BlockHeight::new(from), BlockHeight::new(to)).unwrap()
    }

    fn extractor(mock: MockChainReader, overrides: OverrideTable) -> SwapLedgerExtractor {
        SwapLedgerExtractor::new(Arc::new(mock), OUSD, half(), 1000, Arc::new(overrides))
    }

    #[test]
    fn test_route_of() {
        // single hop
        assert_eq!(route_of(3, Direction::Sell, &[3]), Route::In);
        assert_eq!(route_of(3, Direction::Buy, &[3]), Route::Out);
        // first hop
        assert_eq!(route_of(3, Direction::Sell, &[3, 5]), Route::In);
        assert_eq!(route_of(3, Direction::Buy, &[3, 5]), Route::Through);
        // last hop
        assert_eq!(route_of(5, Direction::Buy, &[3, 5]), Route::Out);
        assert_eq!(route_of(5, Direction::Sell, &[3, 5]), Route::Through);
        // middle hop
        assert_eq!(route_of(4, Direction::Sell, &[3, 4, 5]), Route::Through);
        assert_eq!(route_of(4, Direction::Buy, &[3, 4, 5]), Route::Through);

        assert_eq!(route_of(9, Direction::Sell, &[3, 5]), Route::Unknown);
        assert_eq!(route_of(9, Direction::Buy, &[]), Route::Unknown);
    }

    #[tokio::test]
    async fn test_sell_and_buy_classification() {
        let sell_tx = B256::repeat_byte(1);
        let buy_tx = B256::repeat_byte(2);
        // sell: 1000 OUSD in, 990 USDT out
        let sell = swap_log(PAIR, (1000, 0, 0, 990), TRADER, 12, 4, sell_tx);
        // buy: 500 USDT in, 498 OUSD out
        let buy = swap_log(PAIR, (0, 500, 498, 0), TRADER, 11, 0, buy_tx);
        let mock = MockChainReader::new()
            .with_logs(vec![sell.clone(), buy.clone()])
            .with_receipt(receipt(sell_tx, true, vec![sell]))
            .with_receipt(receipt(buy_tx, true, vec![buy]));

        let events = extractor(mock, OverrideTable::default())
            .extract(&market(), range(10, 20))
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].tx_hash, buy_tx);
        assert_eq!(events[0].direction, Direction::Buy);
        assert_eq!(events[0].token0_amount, U256::from(249u64));
        assert_eq!(events[0].token1_amount, U256::from(500u64));
        assert_eq!(events[0].token_out, OUSD);

        assert_eq!(events[1].direction, Direction::Sell);
        assert_eq!(events[1].tracked_amount_raw, U256::from(1000u64));
        assert_eq!(events[1].token0_amount, U256::from(500u64));
        assert_eq!(events[1].in_address, TRADER);
        assert_eq!(events[1].route, Route::In);
        assert_eq!(events[0].route, Route::Out);
        assert_eq!(events[1].provenance, Provenance::Decoded);
    }

    #[tokio::test]
    async fn test_multi_hop_out_address_and_route() {
        let tx = B256::repeat_byte(3);
        let final_recipient = address!("0x00000000000000000000000000000000000000dd");
        let first = swap_log(PAIR, (1000, 0, 0, 990), HOP, 15, 1, tx);
        let second = swap_log(HOP, (0, 990, 1, 0), final_recipient, 15, 3, tx);
        let mock = MockChainReader::new()
            .with_log(first.clone())
            .with_receipt(receipt(tx, true, vec![first, second]));

        let events = extractor(mock, OverrideTable::default())
            .extract(&market(), range(10, 20))
            .await
            .unwrap();

        assert_eq!(events[0].route, Route::In);
        assert_eq!(events[0].out_address, final_recipient);
    }

    #[tokio::test]
    async fn test_failed_transactions_skipped() {
        let tx = B256::repeat_byte(4);
        let log = swap_log(PAIR, (10, 0, 0, 9), TRADER, 12, 0, tx);
        let mock = MockChainReader::new()
            .with_log(log.clone())
            .with_receipt(receipt(tx, false, vec![log]));

        let events = extractor(mock, OverrideTable::default())
            .extract(&market(), range(10, 20))
            .await
            .unwrap();
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_override_replaces_decoded_log() {
        let tx = B256::repeat_byte(5);
        let corrupted = swap_log(PAIR, (1, 0, 0, 1), TRADER, 13, 2, tx);
        let mock = MockChainReader::new().with_log(corrupted);
        let overrides = OverrideTable::from_records(vec![SwapOverride {
            venue: Venue::Uniswap,
            pool: PAIR,
            tx_hash: tx,
            block: BlockHeight::new(13),
            log_index: 2,
            in_address: TRADER,
            out_address: TRADER,
            direction: Direction::Sell,
            tracked_amount: U256::from(4000u64),
            other_amount: U256::from(3900u64),
        }])
        .unwrap();

        let events = extractor(mock, overrides)
            .extract(&market(), range(10, 20))
            .await
            .unwrap();

        assert_eq!(events.len(), 1);
        assert_eq!(events[0].provenance, Provenance::Manual);
        assert_eq!(events[0].token0_amount, U256::from(2000u64));
        assert_eq!(events[0].tracked_amount_raw, U256::from(4000u64));
    }

    #[tokio::test]
    async fn test_untracked_market_rejected() {
        let mock = MockChainReader::new();
        let market = Market {
            token0: WETH,
            ..market()
        };
        let result = extractor(mock, OverrideTable::default())
            .extract(&market, range(10, 20))
            .await;
        assert!(matches!(result, Err(RunError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_zero_net_tracked_amount_is_inconsistent() {
        let tx = B256::repeat_byte(6);
        let log = swap_log(PAIR, (0, 10, 0, 9), TRADER, 12, 0, tx);
        let mock = MockChainReader::new()
            .with_log(log.clone())
            .with_receipt(receipt(tx, true, vec![log]));

        let result = extractor(mock, OverrideTable::default())
            .extract(&market(), range(10, 20))
            .await;
        assert!(matches!(result, Err(RunError::DataConsistency(_))));
    }

    #[tokio::test]
    async fn test_mooniswap_swapped_event() {
        let pool = address!("0x00000000000000000000000000000000000000d1");
        let market = Market {
            venue: Venue::Mooniswap,
            pool,
            token0: Address::ZERO,
            token1: OUSD,
        };
        let tx = B256::repeat_byte(7);
        let swapped = IMooniswap::Swapped {
            account: TRADER,
            src: OUSD,
            dst: Address::ZERO,
            amount: U256::from(600u64),
            result: U256::from(1u64),
            srcBalance: U256::ZERO,
            dstBalance: U256::ZERO,
            totalSupply: U256::ZERO,
            referral: Address::ZERO,
        };
        let log = log_from_event(pool, &swapped, 14, 0, tx);
        let mock = MockChainReader::new()
            .with_log(log.clone())
            .with_receipt(receipt(tx, true, vec![log]));

        let events = extractor(mock, OverrideTable::default())
            .extract(&market, range(10, 20))
            .await
            .unwrap();

        assert_eq!(events[0].direction, Direction::Sell);
        assert!(!events[0].token0_is_tracked);
        assert_eq!(events[0].token1_amount, U256::from(300u64));
        assert_eq!(events[0].token0_amount, U256::from(1u64));
    }

    #[tokio::test]
    async fn test_checkpoint_resume_skips_scanned_blocks() {
        let dir = TempDir::new().unwrap();
        let tx = B256::repeat_byte(8);
        let log = swap_log(PAIR, (10, 0, 0, 9), TRADER, 12, 0, tx);
        let mock = MockChainReader::new()
            .with_log(log.clone())
            .with_receipt(receipt(tx, true, vec![log]));
        let store = CheckpointStore::open(dir.path()).unwrap();

        let first = extractor(mock.clone(), OverrideTable::default())
            .with_checkpoints(store.clone())
            .extract(&market(), range(10, 20))
            .await
            .unwrap();
        let queries_after_first = mock.log_query_count();

        let second = extractor(mock.clone(), OverrideTable::default())
            .with_checkpoints(store)
            .extract(&market(), range(10, 20))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(mock.log_query_count(), queries_after_first);
    }
}
