//! Position records emitted by the balance snapshot extractors.

use crate::domain::{BlockHeight, Venue};
use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};

/// A direct token balance at one block height.
///
/// A zero balance is a valid record, not an absence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalancePosition {
    pub address: Address,
    pub venue: Venue,
    pub block: BlockHeight,
    pub raw_balance: U256,
    /// Present on "after" snapshots only.
    pub corrected_balance: Option<U256>,
    /// Whether the address had contract code at `block`.
    pub is_contract: bool,
}

/// A liquidity-provider claim on a pool's reserves.
///
/// `token0_amount` and `token1_amount` are `reserve * lp_balance /
/// share_denominator`, floored. The corrected amounts restate only the leg
/// that is the tracked token; the paired asset is copied unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LpPosition {
    pub venue: Venue,
    pub block: BlockHeight,
    pub pool: Address,
    pub token0: Address,
    pub token1: Address,
    pub holder: Address,
    pub lp_balance: U256,
    pub share_denominator: U256,
    pub token0_amount: U256,
    pub token1_amount: U256,
    pub corrected_token0_amount: Option<U256>,
    pub corrected_token1_amount: Option<U256>,
}

impl LpPosition {
    pub fn is_empty(&self) -> bool {
        self.lp_balance.is_zero()
    }
}

/// A staked balance in a staking/geyser contract.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StakePosition {
    pub venue: Venue,
    pub block: BlockHeight,
    pub staking_contract: Address,
    pub holder: Address,
    /// Units as accounted by the staking contract (credits or tokens).
    pub staked_units: U256,
    /// Staked amount expressed in tracked-token units.
    pub raw_balance: U256,
    /// Pro-rata share of the contract's actual token balance.
    pub ratioed_balance: U256,
    pub corrected_balance: Option<U256>,
}
