//! Extraction engines: correction factor, per-venue snapshots, swap ledgers.

use crate::datasource::abi::IERC20;
use crate::datasource::{call_typed_if_deployed, ChainError, ChainReader};
use crate::domain::BlockHeight;
use alloy_primitives::{Address, U256};

pub mod balances;
pub mod correction;
pub mod holders;
pub mod lp;
pub mod overrides;
pub mod staking;
pub mod swaps;

pub use balances::DirectBalanceExtractor;
pub use correction::CorrectionFactorCalculator;
pub use holders::{discover_stakers, discover_transfer_recipients, merge_holders};
pub use lp::{LpExtractor, LpPool, LpSnapshot, PoolLayout, Registry};
pub use overrides::{OverrideTable, SwapOverride};
pub use staking::{StakeUnit, StakingExtractor};
pub use swaps::SwapLedgerExtractor;

/// ERC-20 `balanceOf` at `block`.
///
/// An empty return (no code at `token` yet) reads as zero.
pub(crate) async fn token_balance(
    reader: &dyn ChainReader,
    token: Address,
    owner: Address,
    block: BlockHeight,
) -> Result<U256, ChainError> {
    let balance =
        call_typed_if_deployed(reader, token, &IERC20::balanceOfCall { owner }, block).await?;
    Ok(balance.unwrap_or(U256::ZERO))
}

/// Context label for errors raised by one extraction unit.
pub(crate) fn unit_label(kind: &str, block: BlockHeight) -> String {
    format!("{}@{}", kind, block)
}
