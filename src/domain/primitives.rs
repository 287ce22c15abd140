//! Domain primitives: BlockHeight, BlockRange, Venue.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A concrete historical chain height. Never "latest".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockHeight(pub u64);

impl BlockHeight {
    /// Create a BlockHeight from a block number.
    pub fn new(number: u64) -> Self {
        BlockHeight(number)
    }

    /// Get the underlying block number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }

    /// Hex quantity form used by JSON-RPC block tags.
    pub fn to_rpc_tag(&self) -> String {
        format!("0x{:x}", self.0)
    }
}

impl std::fmt::Display for BlockHeight {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockRangeError {
    #[error("block range start {from} is after end {to_exclusive}")]
    Inverted { from: u64, to_exclusive: u64 },
}

/// Half-open block range `[from, to_exclusive)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRange {
    from: BlockHeight,
    to_exclusive: BlockHeight,
}

impl BlockRange {
    pub fn new(from: BlockHeight, to_exclusive: BlockHeight) -> Result<Self, BlockRangeError> {
        if from > to_exclusive {
            return Err(BlockRangeError::Inverted {
                from: from.as_u64(),
                to_exclusive: to_exclusive.as_u64(),
            });
        }
        Ok(BlockRange { from, to_exclusive })
    }

    /// Blocks whose effects separate a snapshot at `before` from one at
    /// `after`: `[before + 1, after + 1)`.
    ///
    /// State read at block N already includes block N's transactions, so
    /// block `before` belongs to the first snapshot and block `after` to
    /// the ledger.
    pub fn between_snapshots(
        before: BlockHeight,
        after: BlockHeight,
    ) -> Result<Self, BlockRangeError> {
        BlockRange::new(
            BlockHeight(before.0.saturating_add(1)),
            BlockHeight(after.0.saturating_add(1)),
        )
    }

    pub fn from(&self) -> BlockHeight {
        self.from
    }

    pub fn to_exclusive(&self) -> BlockHeight {
        self.to_exclusive
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to_exclusive
    }

    pub fn contains(&self, block: u64) -> bool {
        block >= self.from.as_u64() && block < self.to_exclusive.as_u64()
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {})", self.from, self.to_exclusive)
    }
}

/// Venue family, used to dispatch to the matching extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VenueKind {
    /// Plain token balance held in a wallet or contract.
    TokenBalance,
    /// Uniswap V2 style pair with reserves and an LP token.
    ConstantProduct,
    /// One contract per pair holding raw token balances (Mooniswap).
    MultiPool,
    /// Staking/geyser contract accounting deposits per holder.
    Staking,
}

/// A specific on-chain venue the tracked token is held or traded on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    Wallet,
    Uniswap,
    Sushiswap,
    Mooniswap,
    Snowswap,
}

impl Venue {
    pub fn kind(&self) -> VenueKind {
        match self {
            Venue::Wallet => VenueKind::TokenBalance,
            Venue::Uniswap | Venue::Sushiswap => VenueKind::ConstantProduct,
            Venue::Mooniswap => VenueKind::MultiPool,
            Venue::Snowswap => VenueKind::Staking,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Wallet => "wallet",
            Venue::Uniswap => "uniswap",
            Venue::Sushiswap => "sushiswap",
            Venue::Mooniswap => "mooniswap",
            Venue::Snowswap => "snowswap",
        }
    }

    /// Label used for the venue's snapshot file name.
    pub fn snapshot_label(&self) -> &'static str {
        match self {
            Venue::Wallet => "ousd_balances",
            Venue::Uniswap => "uniswap_lp",
            Venue::Sushiswap => "sushiswap_lp",
            Venue::Mooniswap => "mooniswap_lp",
            Venue::Snowswap => "snowswap_stakers",
        }
    }

    /// Label used for the venue's swap ledger file, if it is a trading venue.
    pub fn ledger_label(&self) -> Option<&'static str> {
        match self {
            Venue::Uniswap => Some("uniswap_swaps"),
            Venue::Sushiswap => Some("sushiswap_swaps"),
            Venue::Mooniswap => Some("mooniswap_swaps"),
            Venue::Wallet | Venue::Snowswap => None,
        }
    }

    /// Uniswap V2 forks burn `MINIMUM_LIQUIDITY` LP units on first mint.
    pub fn burns_minimum_liquidity(&self) -> bool {
        matches!(self, Venue::Uniswap | Venue::Sushiswap)
    }
}

impl std::fmt::Display for Venue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Venue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wallet" => Ok(Venue::Wallet),
            "uniswap" => Ok(Venue::Uniswap),
            "sushiswap" => Ok(Venue::Sushiswap),
            "mooniswap" => Ok(Venue::Mooniswap),
            "snowswap" => Ok(Venue::Snowswap),
            other => Err(format!("unknown venue: {}", other)),
        }
    }
}

/// Canonical textual form of an address (EIP-55 checksum).
///
/// Two addresses that differ only in hex case format identically, so this is
/// the join key across every output file.
pub fn format_address(address: &Address) -> String {
    address.to_checksum(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_block_range_rejects_inverted() {
        let result = BlockRange::new(BlockHeight::new(10), BlockHeight::new(5));
        assert!(matches!(result, Err(BlockRangeError::Inverted { .. })));
    }

    #[test]
    fn test_block_range_is_half_open() {
        let range = BlockRange::new(BlockHeight::new(10), BlockHeight::new(12)).unwrap();
        assert!(range.contains(10));
        assert!(range.contains(11));
        assert!(!range.contains(12));
        assert!(!range.is_empty());
    }

    #[test]
    fn test_between_snapshots_excludes_before_includes_after() {
        let range = BlockRange::between_snapshots(BlockHeight::new(100), BlockHeight::new(200))
            .unwrap();
        assert!(!range.contains(100));
        assert!(range.contains(101));
        assert!(range.contains(200));
        assert!(!range.contains(201));

        let same = BlockRange::between_snapshots(BlockHeight::new(7), BlockHeight::new(7)).unwrap();
        assert!(same.is_empty());
        assert!(BlockRange::between_snapshots(BlockHeight::new(8), BlockHeight::new(7)).is_err());
    }

    #[test]
    fn test_block_rpc_tag() {
        assert_eq!(BlockHeight::new(255).to_rpc_tag(), "0xff");
    }

    #[test]
    fn test_venue_labels() {
        assert_eq!(Venue::Wallet.snapshot_label(), "ousd_balances");
        assert_eq!(Venue::Uniswap.ledger_label(), Some("uniswap_swaps"));
        assert_eq!(Venue::Snowswap.ledger_label(), None);
        assert_eq!(Venue::Mooniswap.kind(), VenueKind::MultiPool);
        assert_eq!(Venue::from_str("SushiSwap").unwrap(), Venue::Sushiswap);
    }

    #[test]
    fn test_format_address_is_case_insensitive() {
        let lower = Address::from_str("0x2a8e1e676ec238d8a992307b495b45b3feaa5e86").unwrap();
        let upper = Address::from_str("0x2A8E1E676EC238D8A992307B495B45B3FEAA5E86").unwrap();
        assert_eq!(format_address(&lower), format_address(&upper));
        assert_eq!(
            format_address(&lower),
            "0x2A8e1E676Ec238d8A992307B495b45B3fEAa5e86"
        );
    }
}
