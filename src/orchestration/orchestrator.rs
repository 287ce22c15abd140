use crate::config::Config;
use crate::datasource::ChainReader;
use crate::domain::{BlockHeight, BlockRange, CorrectionFactor, Venue};
use crate::engine::{
    discover_stakers, discover_transfer_recipients, merge_holders, CorrectionFactorCalculator,
    DirectBalanceExtractor, LpExtractor, LpPool, OverrideTable, StakingExtractor,
    SwapLedgerExtractor,
};
use crate::error::{ChainContext, RunError};
use crate::orchestration::plan::{ExtractionUnit, RunPlan};
use crate::output::{
    BalanceRow, CheckpointStore, FactorRecord, FileRecord, LpRow, Manifest, OutputDir, StakeRow,
    SwapRow, SCHEMA_VERSION,
};
use alloy_primitives::Address;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Outcome of a completed run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub factor: CorrectionFactor,
    pub files: Vec<FileRecord>,
}

/// Sequences factor calculation, snapshot extraction and ledger extraction.
///
/// The correction factor is computed here, once, and handed to every
/// "after" extraction and every ledger.
#[derive(Debug, Clone)]
pub struct RunOrchestrator {
    reader: Arc<dyn ChainReader>,
    config: Config,
}

impl RunOrchestrator {
    pub fn new(reader: Arc<dyn ChainReader>, config: Config) -> Self {
        Self { reader, config }
    }

    pub async fn run(
        &self,
        addresses: &[Address],
        overrides: OverrideTable,
    ) -> Result<RunSummary, RunError> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let config = &self.config;

        // Fail on a used location before touching the chain.
        let output = OutputDir::claim(&config.output_dir)?;
        let checkpoints = config
            .checkpoint_dir
            .as_deref()
            .map(CheckpointStore::open)
            .transpose()?;
        info!(
            %run_id,
            before = %config.before_block,
            after = %config.after_block,
            addresses = addresses.len(),
            "Starting run"
        );

        let factor = CorrectionFactorCalculator::new(self.reader.clone(), config.tracked_token)
            .compute(config.before_block, config.after_block)
            .await?;

        let plan = self.prepare(addresses).await?;
        let units = plan.units(config.before_block, config.after_block, factor)?;

        let mut ledger = SwapLedgerExtractor::new(
            self.reader.clone(),
            config.tracked_token,
            factor,
            config.log_page_blocks,
            Arc::new(overrides),
        );
        if let Some(store) = checkpoints {
            ledger = ledger.with_checkpoints(store);
        }

        let plan = &plan;
        let output_ref = &output;
        let ledger_ref = &ledger;
        let mut results = stream::iter(units)
            .map(|unit| async move {
                let result = self.execute(&unit, plan, output_ref, ledger_ref).await;
                (unit.label(), result)
            })
            .buffer_unordered(config.worker_pool_size);

        let mut files = Vec::new();
        let mut failed = Vec::new();
        while let Some((label, result)) = results.next().await {
            match result {
                Ok(record) => files.push(record),
                Err(e) if e.is_fatal() => {
                    error!(unit = %label, error = %e, "Aborting run");
                    return Err(e);
                }
                Err(e) => {
                    warn!(unit = %label, error = %e, "Extraction unit failed");
                    failed.push(format!("{} ({})", label, e));
                }
            }
        }
        drop(results);

        if !failed.is_empty() {
            failed.sort();
            return Err(RunError::UnitsFailed(failed));
        }

        files.sort_by(|a, b| a.name.cmp(&b.name));
        let manifest = Manifest {
            schema_version: SCHEMA_VERSION,
            run_id,
            started_at,
            finished_at: Utc::now(),
            tracked_token: crate::domain::format_address(&config.tracked_token),
            before_block: config.before_block.as_u64(),
            after_block: config.after_block.as_u64(),
            correction_factor: FactorRecord::from(&factor),
            files: files.clone(),
        };
        output.write_manifest(&manifest)?;
        info!(%run_id, files = files.len(), "Run complete");

        Ok(RunSummary {
            run_id,
            factor,
            files,
        })
    }

    /// Resolve pools and holder lists at the "after" block.
    async fn prepare(&self, addresses: &[Address]) -> Result<RunPlan, RunError> {
        let config = &self.config;
        let reader = self.reader.as_ref();
        let block = config.after_block;
        let tracked = config.tracked_token;

        let mut pools = Vec::new();
        for quote in &config.uniswap_quote_tokens {
            pools.push(
                LpPool::resolve_pair(
                    reader,
                    Venue::Uniswap,
                    config.uniswap_factory,
                    tracked,
                    *quote,
                    block,
                )
                .await?,
            );
        }
        for quote in &config.sushiswap_quote_tokens {
            let pool = LpPool::resolve_pair(
                reader,
                Venue::Sushiswap,
                config.sushiswap_factory,
                tracked,
                *quote,
                block,
            )
            .await?;
            pools.push(
                pool.with_registry(reader, config.sushiswap_masterchef, block)
                    .await?,
            );
        }
        for address in &config.mooniswap_pools {
            let pool = LpPool::resolve_mooniswap(reader, *address, block).await?;
            if !pool.contains(&tracked) {
                return Err(RunError::Configuration(format!(
                    "mooniswap pool {} does not hold {}",
                    address, tracked
                )));
            }
            pools.push(pool);
        }

        let mut plan = RunPlan {
            wallet_holders: addresses.to_vec(),
            pools,
            pool_holders: HashMap::new(),
            staking_contract: config.snowswap_geyser,
            stakers: addresses.to_vec(),
            reconcile_lp: config.discover_holders && config.discovery_start_block.as_u64() == 0,
        };

        if config.discover_holders {
            let range = BlockRange::new(
                config.discovery_start_block,
                BlockHeight::new(block.as_u64() + 1),
            )
            .map_err(|e| RunError::Configuration(format!("DISCOVERY_START_BLOCK: {}", e)))?;

            for pool in &plan.pools {
                let found =
                    discover_transfer_recipients(reader, pool.address, range, config.log_page_blocks)
                        .await
                        .in_unit(|| format!("{} holder discovery {}", pool.venue, pool.address))?;
                plan.pool_holders
                    .insert(pool.address, merge_holders(addresses, &found));
            }
            if let Some(geyser) = plan.staking_contract {
                let found = discover_stakers(reader, geyser, range, config.log_page_blocks)
                    .await
                    .in_unit(|| format!("staker discovery {}", geyser))?;
                plan.stakers = merge_holders(addresses, &found);
            }
        }

        info!(
            pools = plan.pools.len(),
            stakers = plan.stakers.len(),
            "Resolved pools and holders"
        );
        Ok(plan)
    }

    async fn execute(
        &self,
        unit: &ExtractionUnit,
        plan: &RunPlan,
        output: &OutputDir,
        ledger: &SwapLedgerExtractor,
    ) -> Result<FileRecord, RunError> {
        let config = &self.config;
        let file_name = unit.file_name();
        match unit {
            ExtractionUnit::Balances { block, side } => {
                let positions = DirectBalanceExtractor::new(self.reader.clone(), config.tracked_token)
                    .extract(&plan.wallet_holders, *block, side)
                    .await?;
                let rows: Vec<BalanceRow> = positions.iter().map(BalanceRow::from).collect();
                output.write_csv(&file_name, &rows)
            }
            ExtractionUnit::Lp { venue, block, side } => {
                let extractor = LpExtractor::new(
                    self.reader.clone(),
                    config.tracked_token,
                    config.omit_zero_lp_rows,
                );
                let mut rows = Vec::new();
                for pool in plan.pools_of(*venue) {
                    let snapshot = extractor
                        .extract(pool, plan.holders_of(&pool.address), *block, side)
                        .await?;
                    if plan.reconcile_lp {
                        snapshot.reconcile()?;
                    }
                    rows.extend(snapshot.positions.iter().map(LpRow::from));
                }
                output.write_csv(&file_name, &rows)
            }
            ExtractionUnit::Staking { block, side } => {
                let geyser = plan.staking_contract.ok_or_else(|| {
                    RunError::Configuration("staking unit without staking contract".to_string())
                })?;
                let positions = StakingExtractor::new(
                    self.reader.clone(),
                    config.tracked_token,
                    geyser,
                    config.snowswap_stake_unit,
                )
                .extract(&plan.stakers, *block, side)
                .await?;
                let rows: Vec<StakeRow> = positions.iter().map(StakeRow::from).collect();
                output.write_csv(&file_name, &rows)
            }
            ExtractionUnit::Ledger { venue, range } => {
                let mut rows = Vec::new();
                for market in plan.markets(*venue) {
                    let events = ledger.extract(&market, *range).await?;
                    rows.extend(events.iter().map(SwapRow::from));
                }
                output.write_csv(&file_name, &rows)
            }
        }
    }
}

