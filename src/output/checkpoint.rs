//! Persisted progress of swap ledger scans.

use crate::datasource::ScanCursor;
use crate::domain::{BlockRange, Market, SwapEvent};
use crate::error::RunError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerCheckpoint {
    pub market: Market,
    pub range_from: u64,
    pub range_to_exclusive: u64,
    pub cursor: ScanCursor,
    pub events: Vec<SwapEvent>,
}

/// One JSON file per (market, range) under a directory.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn open(dir: &Path) -> Result<Self, RunError> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn path_for(&self, market: &Market, range: &BlockRange) -> PathBuf {
        self.dir.join(format!(
            "{}_{:x}_{}-{}.json",
            market.venue,
            market.pool,
            range.from(),
            range.to_exclusive()
        ))
    }

    pub fn load(
        &self,
        market: &Market,
        range: &BlockRange,
    ) -> Result<Option<LedgerCheckpoint>, RunError> {
        let path = self.path_for(market, range);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)?;
        let checkpoint: LedgerCheckpoint = serde_json::from_slice(&bytes)?;
        if checkpoint.market != *market
            || checkpoint.range_from != range.from().as_u64()
            || checkpoint.range_to_exclusive != range.to_exclusive().as_u64()
        {
            return Err(RunError::Configuration(format!(
                "checkpoint {} does not match market {} range {}",
                path.display(),
                market.label(),
                range
            )));
        }
        debug!(path = %path.display(), next_block = checkpoint.cursor.next_block, "Loaded checkpoint");
        Ok(Some(checkpoint))
    }

    /// Write atomically through a temporary file.
    pub fn save(&self, checkpoint: &LedgerCheckpoint) -> Result<(), RunError> {
        let range = BlockRange::new(
            crate::domain::BlockHeight::new(checkpoint.range_from),
            crate::domain::BlockHeight::new(checkpoint.range_to_exclusive),
        )
        .map_err(|e| RunError::Configuration(e.to_string()))?;
        let path = self.path_for(&checkpoint.market, &range);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(checkpoint)?)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BlockHeight, Venue};
    use alloy_primitives::address;
    use tempfile::TempDir;

    fn market() -> Market {
        Market {
            venue: Venue::Sushiswap,
            pool: address!("0x00000000000000000000000000000000000000a1"),
            token0: address!("0x0000000000000000000000000000000000000001"),
            token1: address!("0x0000000000000000000000000000000000000002"),
        }
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::open(dir.path()).unwrap();
        let range = BlockRange::new(BlockHeight::new(10), BlockHeight::new(20)).unwrap();

        assert!(store.load(&market(), &range).unwrap().is_none());

        let checkpoint = LedgerCheckpoint {
            market: market(),
            range_from: 10,
            range_to_exclusive: 20,
            cursor: ScanCursor {
                next_block: 15,
                last_seen: Some((14, 2)),
            },
            events: Vec::new(),
        };
        store.save(&checkpoint).unwrap();
        assert_eq!(store.load(&market(), &range).unwrap(), Some(checkpoint));
    }
}
