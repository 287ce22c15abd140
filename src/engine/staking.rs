//! Staking/geyser positions (SnowSwap).

use super::{token_balance, unit_label};
use crate::datasource::abi::{IGeyser, IRebasingToken};
use crate::datasource::{call_typed, ChainReader};
use crate::domain::{BlockHeight, SnapshotSide, StakePosition, Venue};
use crate::error::{ChainContext, RunError};
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::info;

/// Largest tolerated gap between the geyser's accounted credits and the
/// credits the token reports for it.
pub const MAX_CREDIT_DRIFT: u64 = 50;

const ONE_TOKEN: u64 = 1_000_000_000_000_000_000;

/// Unit the staking contract keeps its books in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StakeUnit {
    Tokens,
    /// Rebasing credits; converted with `rebasingCreditsPerToken` at the block.
    Credits,
}

impl std::str::FromStr for StakeUnit {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tokens" => Ok(StakeUnit::Tokens),
            "credits" => Ok(StakeUnit::Credits),
            other => Err(format!("unknown stake unit: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StakingExtractor {
    reader: Arc<dyn ChainReader>,
    tracked_token: Address,
    staking_contract: Address,
    unit: StakeUnit,
}

impl StakingExtractor {
    pub fn new(
        reader: Arc<dyn ChainReader>,
        tracked_token: Address,
        staking_contract: Address,
        unit: StakeUnit,
    ) -> Self {
        Self {
            reader,
            tracked_token,
            staking_contract,
            unit,
        }
    }

    pub async fn extract(
        &self,
        holders: &[Address],
        block: BlockHeight,
        side: &SnapshotSide,
    ) -> Result<Vec<StakePosition>, RunError> {
        let label = unit_label(Venue::Snowswap.snapshot_label(), block);
        let reader = self.reader.as_ref();
        info!(
            unit = %label,
            contract = %self.staking_contract,
            side = side.label(),
            holders = holders.len(),
            "Extracting stakes"
        );

        let total_staked = call_typed(
            reader,
            self.staking_contract,
            &IGeyser::totalSupplyCall {},
            block,
        )
        .await
        .in_unit(|| format!("{} totalSupply", label))?;
        let known_balance = token_balance(reader, self.tracked_token, self.staking_contract, block)
            .await
            .in_unit(|| format!("{} contract balance", label))?;

        let credits_per_token = match self.unit {
            StakeUnit::Tokens => None,
            StakeUnit::Credits => Some(self.check_credit_drift(total_staked, block, &label).await?),
        };

        let mut positions = Vec::with_capacity(holders.len());
        for holder in holders {
            let staked_units = call_typed(
                reader,
                self.staking_contract,
                &IGeyser::balanceOfCall { account: *holder },
                block,
            )
            .await
            .in_unit(|| format!("{} stake of {}", label, holder))?;

            let raw_balance = match credits_per_token {
                None => staked_units,
                Some(cpt) => mul_div(staked_units, U256::from(ONE_TOKEN), cpt)?,
            };
            let ratioed_balance = if total_staked.is_zero() {
                U256::ZERO
            } else {
                mul_div(known_balance, staked_units, total_staked)?
            };
            let corrected_balance = side
                .correct(raw_balance)
                .map_err(|e| RunError::DataConsistency(e.to_string()))?;

            positions.push(StakePosition {
                venue: Venue::Snowswap,
                block,
                staking_contract: self.staking_contract,
                holder: *holder,
                staked_units,
                raw_balance,
                ratioed_balance,
                corrected_balance,
            });
        }

        info!(unit = %label, rows = positions.len(), "Stakes extracted");
        Ok(positions)
    }

    /// Verify the contract's books match the token's, returning credits per token.
    async fn check_credit_drift(
        &self,
        total_staked: U256,
        block: BlockHeight,
        label: &str,
    ) -> Result<U256, RunError> {
        let reader = self.reader.as_ref();
        let cpt = call_typed(
            reader,
            self.tracked_token,
            &IRebasingToken::rebasingCreditsPerTokenCall {},
            block,
        )
        .await
        .in_unit(|| format!("{} credits per token", label))?;
        if cpt.is_zero() {
            return Err(RunError::DataConsistency(format!(
                "{}: rebasingCreditsPerToken is zero",
                label
            )));
        }

        let token_credits = call_typed(
            reader,
            self.tracked_token,
            &IRebasingToken::creditsBalanceOfCall {
                account: self.staking_contract,
            },
            block,
        )
        .await
        .in_unit(|| format!("{} contract credits", label))?;

        let drift = if total_staked > token_credits {
            total_staked - token_credits
        } else {
            token_credits - total_staked
        };
        if drift >= U256::from(MAX_CREDIT_DRIFT) {
            return Err(RunError::DataConsistency(format!(
                "{}: staking contract accounts {} credits but token reports {}",
                label, total_staked, token_credits
            )));
        }
        Ok(cpt)
    }
}

fn mul_div(a: U256, b: U256, denominator: U256) -> Result<U256, RunError> {
    a.checked_mul(b)
        .map(|scaled| scaled / denominator)
        .ok_or_else(|| RunError::DataConsistency(format!("overflow computing {} * {}", a, b)))
}
