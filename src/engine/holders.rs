//! Holder discovery from event logs.

use crate::datasource::abi::{IERC20, IGeyser};
use crate::datasource::{ChainError, ChainReader, LogFilter, LogScan};
use crate::domain::BlockRange;
use alloy_primitives::Address;
use std::collections::HashSet;
use tracing::info;

/// Every non-zero recipient of `token`'s `Transfer` events in `range`.
pub async fn discover_transfer_recipients(
    reader: &dyn ChainReader,
    token: Address,
    range: BlockRange,
    page_blocks: u64,
) -> Result<Vec<Address>, ChainError> {
    let filter = LogFilter::for_event::<IERC20::Transfer>(token);
    let mut found = Vec::new();
    for entry in LogScan::new(reader, filter, range, page_blocks)
        .collect_all()
        .await?
    {
        let transfer: IERC20::Transfer = entry.decode()?;
        if transfer.to != Address::ZERO {
            found.push(transfer.to);
        }
    }
    let holders = merge_holders(&[], &found);
    info!(%token, %range, holders = holders.len(), "Discovered transfer recipients");
    Ok(holders)
}

/// Every address that ever staked into `staking_contract` in `range`.
pub async fn discover_stakers(
    reader: &dyn ChainReader,
    staking_contract: Address,
    range: BlockRange,
    page_blocks: u64,
) -> Result<Vec<Address>, ChainError> {
    let filter = LogFilter::for_event::<IGeyser::Staked>(staking_contract);
    let found = LogScan::new(reader, filter, range, page_blocks)
        .collect_all()
        .await?
        .iter()
        .map(|entry| entry.decode::<IGeyser::Staked>().map(|staked| staked.user))
        .collect::<Result<Vec<_>, _>>()?;
    let stakers = merge_holders(&[], &found);
    info!(contract = %staking_contract, %range, stakers = stakers.len(), "Discovered stakers");
    Ok(stakers)
}

/// Union of `base` and `discovered`, first-seen order, without duplicates.
pub fn merge_holders(base: &[Address], discovered: &[Address]) -> Vec<Address> {
    let mut seen = HashSet::with_capacity(base.len() + discovered.len());
    base.iter()
        .chain(discovered)
        .filter(|a| seen.insert(**a))
        .copied()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::mock::log_from_event;
    use crate::datasource::MockChainReader;
    use crate::domain::BlockHeight;
    use alloy_primitives::{address, B256, U256};

    const PAIR: Address = address!("0x00000000000000000000000000000000000000a1");
    const ALICE: Address = address!("0x000000000000000000000000000000000000a11c");
    const BOB: Address = address!("0x0000000000000000000000000000000000000b0b");

    fn transfer(to: Address, block: u64) -> crate::datasource::LogEntry {
        let event = IERC20::Transfer {
            from: Address::ZERO,
            to,
            value: U256::from(1u64),
        };
        log_from_event(PAIR, &event, block, 0, B256::repeat_byte(block as u8))
    }

    #[test]
    fn test_merge_keeps_first_seen_order() {
        let merged = merge_holders(&[BOB, ALICE], &[ALICE, PAIR, BOB]);
        assert_eq!(merged, vec![BOB, ALICE, PAIR]);
    }

    #[tokio::test]
    async fn test_transfer_recipients_skip_burns() {
        let mock = MockChainReader::new().with_logs(vec![
            transfer(ALICE, 3),
            transfer(Address::ZERO, 4),
            transfer(BOB, 5),
            transfer(ALICE, 6),
        ]);
        let range = BlockRange::new(BlockHeight::new(0), BlockHeight::new(10)).unwrap();

        let holders = discover_transfer_recipients(&mock, PAIR, range, 100)
            .await
            .unwrap();
        assert_eq!(holders, vec![ALICE, BOB]);
    }

    #[tokio::test]
    async fn test_stakers() {
        let geyser = address!("0x00000000000000000000000000000000000000c5");
        let staked = IGeyser::Staked {
            user: BOB,
            amount: U256::from(9u64),
        };
        let mock = MockChainReader::new().with_log(log_from_event(
            geyser,
            &staked,
            2,
            1,
            B256::repeat_byte(2),
        ));
        let range = BlockRange::new(BlockHeight::new(0), BlockHeight::new(3)).unwrap();

        let stakers = discover_stakers(&mock, geyser, range, 100).await.unwrap();
        assert_eq!(stakers, vec![BOB]);
    }
}
