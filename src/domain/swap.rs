//! Swap ledger records.

use crate::domain::{BlockHeight, Venue};
use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};

/// Direction of a trade from the tracked token's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Tracked token left the pool (it was an output leg).
    Buy,
    /// Tracked token entered the pool (it was an input leg).
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

impl std::str::FromStr for Direction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "buy" => Ok(Direction::Buy),
            "sell" => Ok(Direction::Sell),
            other => Err(format!("invalid direction: {}", other)),
        }
    }
}

/// Where a ledger row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Decoded from the venue's event log.
    Decoded,
    /// Hand-authored override replacing a corrupted on-chain record.
    Manual,
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provenance::Decoded => write!(f, "decoded"),
            Provenance::Manual => write!(f, "manual"),
        }
    }
}

/// Role of this market's swap within its transaction's swap chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Route {
    /// Tracked token is the transaction's initial input.
    In,
    /// Tracked token is the transaction's final output.
    Out,
    /// Tracked token is an intermediate hop.
    Through,
    /// Not derived: manual rows, or no swap in the receipt matched.
    Unknown,
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Route::In => "in",
            Route::Out => "out",
            Route::Through => "through",
            Route::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// A token pair traded on one venue contract.
///
/// token0/token1 are fixed per pool; they are read once when the market is
/// resolved and carried for the life of the extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Market {
    pub venue: Venue,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
}

impl Market {
    /// Whether `token` is token0 (`Some(true)`), token1 (`Some(false)`) or
    /// neither (`None`).
    pub fn token0_is(&self, token: &Address) -> Option<bool> {
        if &self.token0 == token {
            Some(true)
        } else if &self.token1 == token {
            Some(false)
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        format!("{}:{}", self.venue, self.pool)
    }
}

/// One trade of the tracked token on one market.
///
/// Exactly one of `token_in`/`token_out` is the tracked token. The tracked
/// leg of `token0_amount`/`token1_amount` is already corrected;
/// `tracked_amount_raw` keeps the uncorrected value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwapEvent {
    pub market: Market,
    pub block: BlockHeight,
    pub log_index: u64,
    pub tx_hash: B256,
    pub in_address: Address,
    pub out_address: Address,
    pub direction: Direction,
    pub token0_amount: U256,
    pub token1_amount: U256,
    pub tracked_amount_raw: U256,
    pub token_in: Address,
    pub token_out: Address,
    pub token0_is_tracked: bool,
    pub route: Route,
    pub provenance: Provenance,
}

impl SwapEvent {
    /// The tracked token's address as recorded on this event.
    pub fn tracked_token(&self) -> Address {
        if self.token0_is_tracked {
            self.market.token0
        } else {
            self.market.token1
        }
    }

    /// True when exactly one of token_in/token_out is the tracked token.
    pub fn has_single_tracked_leg(&self) -> bool {
        let tracked = self.tracked_token();
        (self.token_in == tracked) != (self.token_out == tracked)
    }
}
