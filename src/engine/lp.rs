//! Liquidity-pool positions for constant-product pairs and Mooniswap pools.
//!
//! Underlying amounts are `floor(reserve * lp_balance / share_denominator)`.
//! Uniswap V2 forks lock `MINIMUM_LIQUIDITY` LP units at the zero address on
//! the first mint, so their denominator excludes those units.

use super::{token_balance, unit_label};
use crate::datasource::abi::{IERC20, IMasterChef, IMooniswap, IUniswapV2Factory, IUniswapV2Pair};
use crate::datasource::{call_typed, call_typed_if_deployed, ChainReader};
use crate::domain::{BlockHeight, LpPosition, SnapshotSide, Venue, VenueKind};
use crate::error::{ChainContext, RunError};
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const MINIMUM_LIQUIDITY: u64 = 1000;

/// Staking registry holding LP tokens on behalf of holders (SushiSwap MasterChef).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registry {
    pub contract: Address,
    pub pid: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolLayout {
    /// `getReserves` pair, optionally with LP staked in a registry.
    UniswapV2 { registry: Option<Registry> },
    /// Reserves are the pool's own token balances.
    Mooniswap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LpPool {
    pub venue: Venue,
    pub address: Address,
    pub token0: Address,
    pub token1: Address,
    pub layout: PoolLayout,
}

impl LpPool {
    /// Resolve a Uniswap V2 style pair through its factory.
    ///
    /// A pair the factory does not know is a configuration error.
    pub async fn resolve_pair(
        reader: &dyn ChainReader,
        venue: Venue,
        factory: Address,
        token_a: Address,
        token_b: Address,
        block: BlockHeight,
    ) -> Result<Self, RunError> {
        let context = || format!("{} pair {}/{}@{}", venue, token_a, token_b, block);
        let pair = call_typed(
            reader,
            factory,
            &IUniswapV2Factory::getPairCall {
                tokenA: token_a,
                tokenB: token_b,
            },
            block,
        )
        .await
        .in_unit(context)?;

        if pair == Address::ZERO {
            return Err(RunError::Configuration(format!(
                "{} factory {} has no pair for {}/{} at block {}",
                venue, factory, token_a, token_b, block
            )));
        }

        let token0 = call_typed(reader, pair, &IUniswapV2Pair::token0Call {}, block)
            .await
            .in_unit(context)?;
        let token1 = call_typed(reader, pair, &IUniswapV2Pair::token1Call {}, block)
            .await
            .in_unit(context)?;

        Ok(LpPool {
            venue,
            address: pair,
            token0,
            token1,
            layout: PoolLayout::UniswapV2 { registry: None },
        })
    }

    pub async fn resolve_mooniswap(
        reader: &dyn ChainReader,
        pool: Address,
        block: BlockHeight,
    ) -> Result<Self, RunError> {
        let context = || format!("mooniswap pool {}@{}", pool, block);
        let token0 = call_typed(reader, pool, &IMooniswap::tokensCall { i: U256::ZERO }, block)
            .await
            .in_unit(context)?;
        let token1 = call_typed(
            reader,
            pool,
            &IMooniswap::tokensCall {
                i: U256::from(1u64),
            },
            block,
        )
        .await
        .in_unit(context)?;

        Ok(LpPool {
            venue: Venue::Mooniswap,
            address: pool,
            token0,
            token1,
            layout: PoolLayout::Mooniswap,
        })
    }

    /// Attach the registry pool id that stakes this pair's LP token, if any.
    ///
    /// Pool ids are scanned from the highest down; the first match wins.
    pub async fn with_registry(
        mut self,
        reader: &dyn ChainReader,
        registry: Address,
        block: BlockHeight,
    ) -> Result<Self, RunError> {
        let context = || format!("{} registry {}@{}", self.venue, registry, block);
        let length = call_typed(reader, registry, &IMasterChef::poolLengthCall {}, block)
            .await
            .in_unit(context)?;
        let length: u64 = length.try_into().map_err(|_| {
            RunError::DataConsistency(format!("registry {} reports pool length {}", registry, length))
        })?;

        for pid in (0..length).rev() {
            let info = call_typed(
                reader,
                registry,
                &IMasterChef::poolInfoCall {
                    pid: U256::from(pid),
                },
                block,
            )
            .await
            .in_unit(context)?;
            if info.lpToken == self.address {
                debug!(pool = %self.address, pid, "Found registry pool id");
                self.layout = PoolLayout::UniswapV2 {
                    registry: Some(Registry {
                        contract: registry,
                        pid,
                    }),
                };
                return Ok(self);
            }
        }

        warn!(pool = %self.address, %registry, "Pair is not listed in registry");
        Ok(self)
    }

    pub fn contains(&self, token: &Address) -> bool {
        &self.token0 == token || &self.token1 == token
    }

    fn registry(&self) -> Option<Registry> {
        match self.layout {
            PoolLayout::UniswapV2 { registry } => registry,
            PoolLayout::Mooniswap => None,
        }
    }
}

/// Pool-level state and the per-holder positions derived from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LpSnapshot {
    pub pool: LpPool,
    pub block: BlockHeight,
    pub total_supply: U256,
    pub share_denominator: U256,
    pub reserve0: U256,
    pub reserve1: U256,
    pub positions: Vec<LpPosition>,
}

impl LpSnapshot {
    /// Check that holder balances account for the whole pool.
    ///
    /// Every LP unit must belong to some holder, and each reserve may exceed
    /// the summed underlying amounts by at most one floor unit per holder
    /// beyond the first.
    pub fn reconcile(&self) -> Result<(), RunError> {
        let mut lp_sum = U256::ZERO;
        let mut sum0 = U256::ZERO;
        let mut sum1 = U256::ZERO;
        for p in &self.positions {
            lp_sum += p.lp_balance;
            sum0 += p.token0_amount;
            sum1 += p.token1_amount;
        }

        if lp_sum != self.share_denominator {
            return Err(RunError::DataConsistency(format!(
                "{} pool {} at block {}: holders own {} LP units of {}",
                self.pool.venue, self.pool.address, self.block, lp_sum, self.share_denominator
            )));
        }

        let holders = self.positions.iter().filter(|p| !p.is_empty()).count() as u64;
        let tolerance = U256::from(holders.saturating_sub(1));
        for (reserve, sum, token) in [
            (self.reserve0, sum0, self.pool.token0),
            (self.reserve1, sum1, self.pool.token1),
        ] {
            if sum > reserve || reserve - sum > tolerance {
                return Err(RunError::DataConsistency(format!(
                    "{} pool {} at block {}: underlying {} sums to {}, reserve {}",
                    self.pool.venue,
                    self.pool.address,
                    self.block,
                    token,
                    sum,
                    reserve
                )));
            }
        }
        Ok(())
    }
}

/// Share of each reserve owned by `lp_balance` LP units, rounded down.
///
/// A zero denominator means the pool is empty: every holder gets zero, but a
/// holder claiming a balance in an empty pool is inconsistent.
pub fn underlying_amounts(
    lp_balance: U256,
    share_denominator: U256,
    reserve0: U256,
    reserve1: U256,
) -> Result<(U256, U256), String> {
    if share_denominator.is_zero() {
        if lp_balance.is_zero() {
            return Ok((U256::ZERO, U256::ZERO));
        }
        return Err(format!(
            "holder owns {} LP units of an empty pool",
            lp_balance
        ));
    }
    if lp_balance > share_denominator {
        return Err(format!(
            "holder owns {} LP units but only {} exist",
            lp_balance, share_denominator
        ));
    }
    let share = |reserve: U256| {
        reserve
            .checked_mul(lp_balance)
            .map(|scaled| scaled / share_denominator)
            .ok_or_else(|| format!("overflow computing share of reserve {}", reserve))
    };
    Ok((share(reserve0)?, share(reserve1)?))
}

/// LP positions for constant-product and multi-pool venues.
#[derive(Debug, Clone)]
pub struct LpExtractor {
    reader: Arc<dyn ChainReader>,
    tracked_token: Address,
    omit_zero_rows: bool,
}

impl LpExtractor {
    pub fn new(reader: Arc<dyn ChainReader>, tracked_token: Address, omit_zero_rows: bool) -> Self {
        Self {
            reader,
            tracked_token,
            omit_zero_rows,
        }
    }

    pub async fn extract(
        &self,
        pool: &LpPool,
        holders: &[Address],
        block: BlockHeight,
        side: &SnapshotSide,
    ) -> Result<LpSnapshot, RunError> {
        let label = unit_label(pool.venue.snapshot_label(), block);
        let reader = self.reader.as_ref();
        info!(
            unit = %label,
            pool = %pool.address,
            side = side.label(),
            holders = holders.len(),
            "Extracting LP positions"
        );

        // Pools are resolved at the after block and may not exist yet here.
        let total_supply =
            call_typed_if_deployed(reader, pool.address, &IERC20::totalSupplyCall {}, block)
                .await
                .in_unit(|| format!("{} totalSupply of {}", label, pool.address))?
                .unwrap_or_else(|| {
                    debug!(unit = %label, pool = %pool.address, "Pool has no code, reading as empty");
                    U256::ZERO
                });
        let share_denominator = if pool.venue.burns_minimum_liquidity() {
            total_supply.saturating_sub(U256::from(MINIMUM_LIQUIDITY))
        } else {
            total_supply
        };

        let (reserve0, reserve1) = self.reserves(pool, block).await.in_unit(|| {
            format!("{} reserves of {}", label, pool.address)
        })?;

        let registry = pool.registry();
        let mut positions = Vec::with_capacity(holders.len());
        for holder in holders {
            if *holder == Address::ZERO || registry.map(|r| r.contract) == Some(*holder) {
                continue;
            }

            let mut lp_balance = token_balance(reader, pool.address, *holder, block)
                .await
                .in_unit(|| format!("{} LP balance of {}", label, holder))?;
            if let Some(registry) = registry {
                let staked = call_typed(
                    reader,
                    registry.contract,
                    &IMasterChef::userInfoCall {
                        pid: U256::from(registry.pid),
                        user: *holder,
                    },
                    block,
                )
                .await
                .in_unit(|| format!("{} registry stake of {}", label, holder))?;
                lp_balance += staked.amount;
            }

            let (token0_amount, token1_amount) =
                underlying_amounts(lp_balance, share_denominator, reserve0, reserve1).map_err(
                    |msg| {
                        RunError::DataConsistency(format!(
                            "{} pool {} holder {}: {}",
                            label, pool.address, holder, msg
                        ))
                    },
                )?;

            let position = LpPosition {
                venue: pool.venue,
                block,
                pool: pool.address,
                token0: pool.token0,
                token1: pool.token1,
                holder: *holder,
                lp_balance,
                share_denominator,
                token0_amount,
                token1_amount,
                corrected_token0_amount: self.correct_leg(pool.token0, token0_amount, side)?,
                corrected_token1_amount: self.correct_leg(pool.token1, token1_amount, side)?,
            };
            if self.omit_zero_rows && position.is_empty() {
                continue;
            }
            positions.push(position);
        }

        info!(unit = %label, pool = %pool.address, rows = positions.len(), "LP positions extracted");
        Ok(LpSnapshot {
            pool: *pool,
            block,
            total_supply,
            share_denominator,
            reserve0,
            reserve1,
            positions,
        })
    }

    /// Only the tracked-token leg is corrected.
    fn correct_leg(
        &self,
        token: Address,
        amount: U256,
        side: &SnapshotSide,
    ) -> Result<Option<U256>, RunError> {
        if token != self.tracked_token {
            return Ok(None);
        }
        side.correct(amount)
            .map_err(|e| RunError::DataConsistency(e.to_string()))
    }

    async fn reserves(
        &self,
        pool: &LpPool,
        block: BlockHeight,
    ) -> Result<(U256, U256), crate::datasource::ChainError> {
        let reader = self.reader.as_ref();
        match pool.venue.kind() {
            VenueKind::ConstantProduct => {
                let reserves = call_typed_if_deployed(
                    reader,
                    pool.address,
                    &IUniswapV2Pair::getReservesCall {},
                    block,
                )
                .await?;
                Ok(reserves
                    .map(|r| (U256::from(r.reserve0), U256::from(r.reserve1)))
                    .unwrap_or((U256::ZERO, U256::ZERO)))
            }
            _ => {
                let reserve0 = self.pool_holding(pool.address, pool.token0, block).await?;
                let reserve1 = self.pool_holding(pool.address, pool.token1, block).await?;
                Ok((reserve0, reserve1))
            }
        }
    }

    /// The zero address stands for native ETH.
    async fn pool_holding(
        &self,
        pool: Address,
        token: Address,
        block: BlockHeight,
    ) -> Result<U256, crate::datasource::ChainError> {
        if token == Address::ZERO {
            self.reader.balance_at(pool, block).await
        } else {
            token_balance(self.reader.as_ref(), token, pool, block).await
        }
    }
}
