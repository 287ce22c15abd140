pub mod config;
pub mod datasource;
pub mod domain;
pub mod engine;
pub mod error;
pub mod orchestration;
pub mod output;

pub use config::Config;
pub use datasource::{ChainError, ChainReader, MockChainReader, RpcChainReader, RpcSettings};
pub use domain::{
    BalancePosition, BlockHeight, BlockRange, CorrectionFactor, Direction, LpPosition, Market,
    Provenance, SnapshotSide, StakePosition, SwapEvent, Venue,
};
pub use error::RunError;
pub use orchestration::{RunOrchestrator, RunSummary};
