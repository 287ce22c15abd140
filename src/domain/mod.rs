//! Domain types for rebasing-token snapshot extraction.
//!
//! This module provides:
//! - Block and venue primitives (BlockHeight, BlockRange, Venue, VenueKind)
//! - The exact-rational CorrectionFactor and the before/after SnapshotSide
//! - Position records for wallet, LP and staking venues
//! - SwapEvent ledger records and the stable (block, log index) ordering

pub mod correction;
pub mod ordering;
pub mod position;
pub mod primitives;
pub mod swap;

pub use correction::{CorrectionFactor, CorrectionFactorError, SnapshotSide};
pub use ordering::{sort_swaps_deterministic, LogOrderingKey};
pub use position::{BalancePosition, LpPosition, StakePosition};
pub use primitives::{format_address, BlockHeight, BlockRange, BlockRangeError, Venue, VenueKind};
pub use swap::{Direction, Market, Provenance, Route, SwapEvent};
