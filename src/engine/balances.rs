use super::{token_balance, unit_label};
use crate::datasource::ChainReader;
use crate::domain::{BalancePosition, BlockHeight, SnapshotSide, Venue};
use crate::error::{ChainContext, RunError};
use alloy_primitives::Address;
use std::sync::Arc;
use tracing::{debug, info};

/// Direct wallet balances of the tracked token.
#[derive(Debug, Clone)]
pub struct DirectBalanceExtractor {
    reader: Arc<dyn ChainReader>,
    token: Address,
}

impl DirectBalanceExtractor {
    pub fn new(reader: Arc<dyn ChainReader>, token: Address) -> Self {
        Self { reader, token }
    }

    /// One position per holder, in input order, zero balances included.
    pub async fn extract(
        &self,
        holders: &[Address],
        block: BlockHeight,
        side: &SnapshotSide,
    ) -> Result<Vec<BalancePosition>, RunError> {
        let label = unit_label(Venue::Wallet.snapshot_label(), block);
        info!(unit = %label, side = side.label(), holders = holders.len(), "Extracting balances");

        let mut positions = Vec::with_capacity(holders.len());
        for holder in holders {
            let raw_balance = token_balance(self.reader.as_ref(), self.token, *holder, block)
                .await
                .in_unit(|| format!("{} holder {}", label, holder))?;
            let code = self
                .reader
                .code_at(*holder, block)
                .await
                .in_unit(|| format!("{} code of {}", label, holder))?;
            let corrected_balance = side
                .correct(raw_balance)
                .map_err(|e| RunError::DataConsistency(e.to_string()))?;

            debug!(%holder, %raw_balance, "Balance");
            positions.push(BalancePosition {
                address: *holder,
                venue: Venue::Wallet,
                block,
                raw_balance,
                corrected_balance,
                is_contract: !code.is_empty(),
            });
        }

        info!(unit = %label, rows = positions.len(), "Balances extracted");
        Ok(positions)
    }
}
