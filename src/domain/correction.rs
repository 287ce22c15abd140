//! Exact rational correction factor for post-incident balances.
//!
//! A rebasing token reports balances as `credits / credits_per_token`. After
//! the incident the credits-per-token rate moved, so reported balances no
//! longer reflect pre-incident value. Multiplying a post-incident balance by
//! `credits_per_token(after) / credits_per_token(before)` restates it.

use alloy_primitives::U256;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CorrectionFactorError {
    #[error("correction factor numerator is zero")]
    ZeroNumerator,
    #[error("correction factor denominator is zero")]
    ZeroDenominator,
    #[error("overflow applying correction factor {factor} to {raw}")]
    Overflow { raw: U256, factor: String },
}

/// Exact ratio applied to every "after" balance and swap leg of the tracked
/// token.
///
/// `apply` computes `floor(raw * numerator / denominator)` in 256-bit integer
/// arithmetic. Floor is the only rounding mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrectionFactor {
    numerator: U256,
    denominator: U256,
}

impl CorrectionFactor {
    pub fn new(numerator: U256, denominator: U256) -> Result<Self, CorrectionFactorError> {
        if numerator.is_zero() {
            return Err(CorrectionFactorError::ZeroNumerator);
        }
        if denominator.is_zero() {
            return Err(CorrectionFactorError::ZeroDenominator);
        }
        Ok(CorrectionFactor {
            numerator,
            denominator,
        })
    }

    pub fn numerator(&self) -> U256 {
        self.numerator
    }

    pub fn denominator(&self) -> U256 {
        self.denominator
    }

    /// Restate a raw post-incident amount, rounding down.
    pub fn apply(&self, raw: U256) -> Result<U256, CorrectionFactorError> {
        raw.checked_mul(self.numerator)
            .map(|scaled| scaled / self.denominator)
            .ok_or_else(|| CorrectionFactorError::Overflow {
                raw,
                factor: self.to_string(),
            })
    }
}

impl std::fmt::Display for CorrectionFactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Which side of the incident a snapshot describes.
///
/// "Before" records never carry a correction; "after" records always do, so
/// the factor travels inside the `After` variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotSide {
    Before,
    After(CorrectionFactor),
}

impl SnapshotSide {
    pub fn factor(&self) -> Option<&CorrectionFactor> {
        match self {
            SnapshotSide::Before => None,
            SnapshotSide::After(factor) => Some(factor),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SnapshotSide::Before => "before",
            SnapshotSide::After(_) => "after",
        }
    }

    /// Corrected amount for "after" snapshots, `None` for "before".
    pub fn correct(&self, raw: U256) -> Result<Option<U256>, CorrectionFactorError> {
        self.factor().map(|factor| factor.apply(raw)).transpose()
    }
}
