//! Stable ledger ordering for deterministic, diffable output.

use crate::domain::SwapEvent;

/// Stable ordering key for chain events.
///
/// Ordering: block number -> log index. Log indexes are unique within a
/// block, so the key is total for events from one chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogOrderingKey {
    /// Block number (primary sort).
    pub block: u64,
    /// Log index within the block (secondary sort).
    pub log_index: u64,
}

impl LogOrderingKey {
    pub fn new(block: u64, log_index: u64) -> Self {
        LogOrderingKey { block, log_index }
    }

    /// Create an ordering key from a SwapEvent.
    pub fn from_swap(event: &SwapEvent) -> Self {
        LogOrderingKey {
            block: event.block.as_u64(),
            log_index: event.log_index,
        }
    }
}

/// Sort swaps deterministically.
pub fn sort_swaps_deterministic(events: &mut [SwapEvent]) {
    events.sort_by_key(LogOrderingKey::from_swap);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BlockHeight, Direction, Market, Provenance, Route, Venue};
    use alloy_primitives::{Address, B256, U256};

    fn make_swap(block: u64, log_index: u64) -> SwapEvent {
        SwapEvent {
            market: Market {
                venue: Venue::Uniswap,
                pool: Address::ZERO,
                token0: Address::ZERO,
                token1: Address::repeat_byte(1),
            },
            block: BlockHeight::new(block),
            log_index,
            tx_hash: B256::repeat_byte(log_index as u8),
            in_address: Address::ZERO,
            out_address: Address::ZERO,
            direction: Direction::Buy,
            token0_amount: U256::ZERO,
            token1_amount: U256::ZERO,
            tracked_amount_raw: U256::ZERO,
            token_in: Address::repeat_byte(1),
            token_out: Address::ZERO,
            token0_is_tracked: true,
            route: Route::Out,
            provenance: Provenance::Decoded,
        }
    }

    #[test]
    fn test_ordering_by_block_then_log_index() {
        assert!(LogOrderingKey::new(1, 9) < LogOrderingKey::new(2, 0));
        assert!(LogOrderingKey::new(2, 0) < LogOrderingKey::new(2, 1));
    }

    #[test]
    fn test_sort_swaps_deterministic() {
        let mut swaps = vec![make_swap(20, 1), make_swap(10, 5), make_swap(20, 0)];
        sort_swaps_deterministic(&mut swaps);

        let keys: Vec<(u64, u64)> = swaps
            .iter()
            .map(|s| (s.block.as_u64(), s.log_index))
            .collect();
        assert_eq!(keys, vec![(10, 5), (20, 0), (20, 1)]);
    }
}
