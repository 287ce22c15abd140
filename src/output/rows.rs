//! CSV row schemas. Numeric columns are decimal strings.

use crate::domain::{format_address, BalancePosition, LpPosition, StakePosition, SwapEvent, Direction};
use alloy_primitives::U256;
use serde::Serialize;

/// A serializable row with a fixed column order.
pub trait CsvRow: Serialize {
    const HEADER: &'static [&'static str];
}

fn opt(value: Option<U256>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceRow {
    pub address: String,
    pub venue: String,
    pub block: u64,
    pub is_contract: bool,
    pub raw_balance: String,
    pub corrected_balance: String,
}

impl CsvRow for BalanceRow {
    const HEADER: &'static [&'static str] = &[
        "address",
        "venue",
        "block",
        "is_contract",
        "raw_balance",
        "corrected_balance",
    ];
}

impl From<&BalancePosition> for BalanceRow {
    fn from(p: &BalancePosition) -> Self {
        Self {
            address: format_address(&p.address),
            venue: p.venue.to_string(),
            block: p.block.as_u64(),
            is_contract: p.is_contract,
            raw_balance: p.raw_balance.to_string(),
            corrected_balance: opt(p.corrected_balance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LpRow {
    pub venue: String,
    pub block: u64,
    pub pool: String,
    pub token0: String,
    pub token1: String,
    pub holder: String,
    pub lp_balance: String,
    pub share_denominator: String,
    pub token0_amount: String,
    pub token1_amount: String,
    pub corrected_token0_amount: String,
    pub corrected_token1_amount: String,
}

impl CsvRow for LpRow {
    const HEADER: &'static [&'static str] = &[
        "venue",
        "block",
        "pool",
        "token0",
        "token1",
        "holder",
        "lp_balance",
        "share_denominator",
        "token0_amount",
        "token1_amount",
        "corrected_token0_amount",
        "corrected_token1_amount",
    ];
}

impl From<&LpPosition> for LpRow {
    fn from(p: &LpPosition) -> Self {
        Self {
            venue: p.venue.to_string(),
            block: p.block.as_u64(),
            pool: format_address(&p.pool),
            token0: format_address(&p.token0),
            token1: format_address(&p.token1),
            holder: format_address(&p.holder),
            lp_balance: p.lp_balance.to_string(),
            share_denominator: p.share_denominator.to_string(),
            token0_amount: p.token0_amount.to_string(),
            token1_amount: p.token1_amount.to_string(),
            corrected_token0_amount: opt(p.corrected_token0_amount),
            corrected_token1_amount: opt(p.corrected_token1_amount),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StakeRow {
    pub venue: String,
    pub block: u64,
    pub staking_contract: String,
    pub holder: String,
    pub staked_units: String,
    pub raw_balance: String,
    pub ratioed_balance: String,
    pub corrected_balance: String,
}

impl CsvRow for StakeRow {
    const HEADER: &'static [&'static str] = &[
        "venue",
        "block",
        "staking_contract",
        "holder",
        "staked_units",
        "raw_balance",
        "ratioed_balance",
        "corrected_balance",
    ];
}

impl From<&StakePosition> for StakeRow {
    fn from(p: &StakePosition) -> Self {
        Self {
            venue: p.venue.to_string(),
            block: p.block.as_u64(),
            staking_contract: format_address(&p.staking_contract),
            holder: format_address(&p.holder),
            staked_units: p.staked_units.to_string(),
            raw_balance: p.raw_balance.to_string(),
            ratioed_balance: p.ratioed_balance.to_string(),
            corrected_balance: opt(p.corrected_balance),
        }
    }
}

/// Swap ledger row. Tracked amounts are corrected; `tracked_amount_raw` is not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwapRow {
    pub venue: String,
    pub pool: String,
    pub block: u64,
    pub log_index: u64,
    pub tx_hash: String,
    pub in_address: String,
    pub out_address: String,
    pub direction: String,
    pub token0: String,
    pub token1: String,
    pub token0_amount: String,
    pub token1_amount: String,
    pub tracked_amount_in: String,
    pub tracked_amount_out: String,
    pub tracked_amount_raw: String,
    pub token_in: String,
    pub token_out: String,
    pub token0_is_tracked: bool,
    pub route: String,
    pub provenance: String,
}

impl CsvRow for SwapRow {
    const HEADER: &'static [&'static str] = &[
        "venue",
        "pool",
        "block",
        "log_index",
        "tx_hash",
        "in_address",
        "out_address",
        "direction",
        "token0",
        "token1",
        "token0_amount",
        "token1_amount",
        "tracked_amount_in",
        "tracked_amount_out",
        "tracked_amount_raw",
        "token_in",
        "token_out",
        "token0_is_tracked",
        "route",
        "provenance",
    ];
}

impl From<&SwapEvent> for SwapRow {
    fn from(e: &SwapEvent) -> Self {
        let tracked = if e.token0_is_tracked {
            e.token0_amount
        } else {
            e.token1_amount
        };
        let (tracked_in, tracked_out) = match e.direction {
            Direction::Sell => (tracked, U256::ZERO),
            Direction::Buy => (U256::ZERO, tracked),
        };
        Self {
            venue: e.market.venue.to_string(),
            pool: format_address(&e.market.pool),
            block: e.block.as_u64(),
            log_index: e.log_index,
            tx_hash: e.tx_hash.to_string(),
            in_address: format_address(&e.in_address),
            out_address: format_address(&e.out_address),
            direction: e.direction.to_string(),
            token0: format_address(&e.market.token0),
            token1: format_address(&e.market.token1),
            token0_amount: e.token0_amount.to_string(),
            token1_amount: e.token1_amount.to_string(),
            tracked_amount_in: tracked_in.to_string(),
            tracked_amount_out: tracked_out.to_string(),
            tracked_amount_raw: e.tracked_amount_raw.to_string(),
            token_in: format_address(&e.token_in),
            token_out: format_address(&e.token_out),
            token0_is_tracked: e.token0_is_tracked,
            route: e.route.to_string(),
            provenance: e.provenance.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BlockHeight, Venue};
    use alloy_primitives::address;
    use std::str::FromStr;

    #[test]
    fn test_balance_row_uses_decimal_strings() {
        let position = BalancePosition {
            address: address!("0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"),
            venue: Venue::Wallet,
            block: BlockHeight::new(2),
            raw_balance: U256::from_str("1000000000000000000000000").unwrap(),
            corrected_balance: Some(U256::from_str("388792167301367049100933").unwrap()),
            is_contract: false,
        };
        let row = BalanceRow::from(&position);
        assert_eq!(row.raw_balance, "1000000000000000000000000");
        assert_eq!(row.corrected_balance, "388792167301367049100933");
        assert_eq!(
            row.address.to_lowercase(),
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
    }

    #[test]
    fn test_before_row_leaves_correction_empty() {
        let position = BalancePosition {
            address: address!("0xbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"),
            venue: Venue::Wallet,
            block: BlockHeight::new(1),
            raw_balance: U256::ZERO,
            corrected_balance: None,
            is_contract: true,
        };
        let row = BalanceRow::from(&position);
        assert_eq!(row.raw_balance, "0");
        assert_eq!(row.corrected_balance, "");
    }

    #[test]
    fn test_headers_match_field_count() {
        assert_eq!(BalanceRow::HEADER.len(), 6);
        assert_eq!(LpRow::HEADER.len(), 12);
        assert_eq!(StakeRow::HEADER.len(), 8);
        assert_eq!(SwapRow::HEADER.len(), 20);
    }
}
