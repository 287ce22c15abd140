//! Derives the run's single correction factor from the token's accounting state.

use crate::datasource::abi::IRebasingToken;
use crate::datasource::{call_typed, ChainReader};
use crate::domain::{BlockHeight, CorrectionFactor};
use crate::error::{ChainContext, RunError};
use alloy_primitives::{Address, U256};
use std::sync::Arc;
use tracing::info;

/// Reads `rebasingCreditsPerToken` around the incident.
///
/// The factor is `cpt(after) / cpt(before)`: a post-incident balance is
/// `credits / cpt(after)`, so scaling it by the factor yields
/// `credits / cpt(before)`, the pre-incident value.
#[derive(Debug, Clone)]
pub struct CorrectionFactorCalculator {
    reader: Arc<dyn ChainReader>,
    token: Address,
}

impl CorrectionFactorCalculator {
    pub fn new(reader: Arc<dyn ChainReader>, token: Address) -> Self {
        Self { reader, token }
    }

    /// Credits per token at `block`. Zero is rejected as implausible.
    pub async fn credits_per_token(&self, block: BlockHeight) -> Result<U256, RunError> {
        let cpt = call_typed(
            self.reader.as_ref(),
            self.token,
            &IRebasingToken::rebasingCreditsPerTokenCall {},
            block,
        )
        .await
        .in_unit(|| format!("credits_per_token@{}", block))?;

        if cpt.is_zero() {
            return Err(RunError::DataConsistency(format!(
                "rebasingCreditsPerToken of {} is zero at block {}",
                self.token, block
            )));
        }
        Ok(cpt)
    }

    pub async fn compute(
        &self,
        before: BlockHeight,
        after: BlockHeight,
    ) -> Result<CorrectionFactor, RunError> {
        let before_cpt = self.credits_per_token(before).await?;
        let after_cpt = self.credits_per_token(after).await?;

        let factor = CorrectionFactor::new(after_cpt, before_cpt)
            .map_err(|e| RunError::DataConsistency(e.to_string()))?;

        info!(
            token = %self.token,
            %before,
            %after,
            %factor,
            "Computed correction factor"
        );
        Ok(factor)
    }
}
