//! Resolved pools, holder lists and the units of work of one run.

use crate::domain::{BlockHeight, BlockRange, CorrectionFactor, Market, SnapshotSide, Venue};
use crate::engine::LpPool;
use crate::output::{ledger_file_name, snapshot_file_name};
use alloy_primitives::Address;
use std::collections::HashMap;

/// One independently retryable piece of extraction, producing one file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionUnit {
    Balances { block: BlockHeight, side: SnapshotSide },
    Lp { venue: Venue, block: BlockHeight, side: SnapshotSide },
    Staking { block: BlockHeight, side: SnapshotSide },
    Ledger { venue: Venue, range: BlockRange },
}

impl ExtractionUnit {
    pub fn file_name(&self) -> String {
        match self {
            ExtractionUnit::Balances { block, .. } => {
                snapshot_file_name(Venue::Wallet.snapshot_label(), block.as_u64())
            }
            ExtractionUnit::Lp { venue, block, .. } => {
                snapshot_file_name(venue.snapshot_label(), block.as_u64())
            }
            ExtractionUnit::Staking { block, .. } => {
                snapshot_file_name(Venue::Snowswap.snapshot_label(), block.as_u64())
            }
            // named by the snapshot blocks the range sits between
            ExtractionUnit::Ledger { venue, range } => ledger_file_name(
                venue.ledger_label().unwrap_or(venue.as_str()),
                range.from().as_u64().saturating_sub(1),
                range.to_exclusive().as_u64().saturating_sub(1),
            ),
        }
    }

    /// Label used in logs and failure reports.
    pub fn label(&self) -> String {
        let name = self.file_name();
        name.trim_end_matches(".csv").to_string()
    }
}

/// Everything resolved before extraction starts.
///
/// The same holder lists serve both snapshots.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub wallet_holders: Vec<Address>,
    pub pools: Vec<LpPool>,
    pub pool_holders: HashMap<Address, Vec<Address>>,
    pub staking_contract: Option<Address>,
    pub stakers: Vec<Address>,
    /// Whether the holder lists are complete enough to reconcile LP totals.
    pub reconcile_lp: bool,
}

impl RunPlan {
    pub fn pools_of(&self, venue: Venue) -> impl Iterator<Item = &LpPool> + '_ {
        self.pools.iter().filter(move |p| p.venue == venue)
    }

    pub fn holders_of(&self, pool: &Address) -> &[Address] {
        self.pool_holders
            .get(pool)
            .map(|h| h.as_slice())
            .unwrap_or(&self.wallet_holders)
    }

    pub fn markets(&self, venue: Venue) -> Vec<Market> {
        self.pools_of(venue)
            .map(|p| Market {
                venue: p.venue,
                pool: p.address,
                token0: p.token0,
                token1: p.token1,
            })
            .collect()
    }

    fn lp_venues(&self) -> Vec<Venue> {
        [Venue::Uniswap, Venue::Sushiswap, Venue::Mooniswap]
            .into_iter()
            .filter(|v| self.pools_of(*v).next().is_some())
            .collect()
    }

    /// Units for both snapshots and the ledgers between them.
    ///
    /// "After" units carry `factor`; "before" units carry none.
    pub fn units(
        &self,
        before: BlockHeight,
        after: BlockHeight,
        factor: CorrectionFactor,
    ) -> Result<Vec<ExtractionUnit>, crate::error::RunError> {
        let range = BlockRange::between_snapshots(before, after)
            .map_err(|e| crate::error::RunError::Configuration(e.to_string()))?;
        let lp_venues = self.lp_venues();
        let mut units = Vec::new();

        for (block, side) in [
            (before, SnapshotSide::Before),
            (after, SnapshotSide::After(factor)),
        ] {
            units.push(ExtractionUnit::Balances { block, side });
            for venue in &lp_venues {
                units.push(ExtractionUnit::Lp {
                    venue: *venue,
                    block,
                    side,
                });
            }
            if self.staking_contract.is_some() {
                units.push(ExtractionUnit::Staking { block, side });
            }
        }
        for venue in lp_venues {
            units.push(ExtractionUnit::Ledger { venue, range });
        }
        Ok(units)
    }
}
