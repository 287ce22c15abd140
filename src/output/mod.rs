//! Write-once output location: CSV sinks and the run manifest.
//!
//! Every file is first written as `<name>.partial` and renamed once complete.
//! `MANIFEST.json` is written last; a directory without it is an incomplete run.

use crate::domain::CorrectionFactor;
use crate::error::RunError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;
use uuid::Uuid;

pub mod checkpoint;
pub mod rows;

pub use checkpoint::{CheckpointStore, LedgerCheckpoint};
pub use rows::{BalanceRow, CsvRow, LpRow, StakeRow, SwapRow};

pub const SCHEMA_VERSION: u32 = 1;
pub const MANIFEST_FILE: &str = "MANIFEST.json";
const PARTIAL_SUFFIX: &str = "partial";

/// A finished output file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub name: String,
    pub rows: usize,
    pub sha256: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactorRecord {
    pub numerator: String,
    pub denominator: String,
}

impl From<&CorrectionFactor> for FactorRecord {
    fn from(factor: &CorrectionFactor) -> Self {
        Self {
            numerator: factor.numerator().to_string(),
            denominator: factor.denominator().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub tracked_token: String,
    pub before_block: u64,
    pub after_block: u64,
    pub correction_factor: FactorRecord,
    pub files: Vec<FileRecord>,
}

#[derive(Debug, Clone)]
pub struct OutputDir {
    root: PathBuf,
}

impl OutputDir {
    /// Take ownership of `path` for one run.
    ///
    /// A location that already holds anything is refused.
    pub fn claim(path: &Path) -> Result<Self, RunError> {
        if path.exists() {
            if !path.is_dir() {
                return Err(RunError::Configuration(format!(
                    "output location {} is not a directory",
                    path.display()
                )));
            }
            if std::fs::read_dir(path)?.next().is_some() {
                return Err(RunError::Configuration(format!(
                    "output location {} already contains data",
                    path.display()
                )));
            }
        }
        std::fs::create_dir_all(path)?;
        info!(path = %path.display(), "Claimed output location");
        Ok(Self {
            root: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Write `rows` under `file_name` with a header line, even when empty.
    pub fn write_csv<R: CsvRow>(&self, file_name: &str, rows: &[R]) -> Result<FileRecord, RunError> {
        let final_path = self.root.join(file_name);
        if final_path.exists() {
            return Err(RunError::Configuration(format!(
                "output file {} already exists",
                final_path.display()
            )));
        }
        let partial = self
            .root
            .join(format!("{}.{}", file_name, PARTIAL_SUFFIX));

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_path(&partial)?;
        writer.write_record(R::HEADER)?;
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        drop(writer);

        let sha256 = hex::encode(Sha256::digest(std::fs::read(&partial)?));
        std::fs::rename(&partial, &final_path)?;
        info!(file = file_name, rows = rows.len(), "Wrote output file");

        Ok(FileRecord {
            name: file_name.to_string(),
            rows: rows.len(),
            sha256,
        })
    }

    pub fn write_manifest(&self, manifest: &Manifest) -> Result<(), RunError> {
        let partial = self
            .root
            .join(format!("{}.{}", MANIFEST_FILE, PARTIAL_SUFFIX));
        std::fs::write(&partial, serde_json::to_vec_pretty(manifest)?)?;
        std::fs::rename(&partial, self.root.join(MANIFEST_FILE))?;
        Ok(())
    }
}

/// Snapshot file name, e.g. `uniswap_lp_11272254.csv`.
pub fn snapshot_file_name(label: &str, block: u64) -> String {
    format!("{}_{}.csv", label, block)
}

/// Ledger file name from the two snapshot blocks, e.g.
/// `uniswap_swaps_11272254-11283000.csv`.
pub fn ledger_file_name(label: &str, before: u64, after: u64) -> String {
    format!("{}_{}-{}.csv", label, before, after)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_claim_refuses_non_empty_dir() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("old.csv"), "x").unwrap();

        let result = OutputDir::claim(dir.path());
        assert!(matches!(result, Err(RunError::Configuration(_))));
    }

    #[test]
    fn test_claim_creates_missing_dir() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("run");
        let out = OutputDir::claim(&target).unwrap();
        assert!(out.path().is_dir());
    }

    #[test]
    fn test_write_csv_header_only_when_empty() {
        let dir = TempDir::new().unwrap();
        let out = OutputDir::claim(&dir.path().join("run")).unwrap();

        let record = out.write_csv::<BalanceRow>("ousd_balances_1.csv", &[]).unwrap();
        assert_eq!(record.rows, 0);

        let content = std::fs::read_to_string(out.path().join("ousd_balances_1.csv")).unwrap();
        assert_eq!(
            content,
            "address,venue,block,is_contract,raw_balance,corrected_balance\n"
        );
        assert!(!out.path().join("ousd_balances_1.csv.partial").exists());
        assert_eq!(record.sha256.len(), 64);
    }

    #[test]
    fn test_write_csv_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let out = OutputDir::claim(&dir.path().join("run")).unwrap();
        out.write_csv::<BalanceRow>("a.csv", &[]).unwrap();
        assert!(out.write_csv::<BalanceRow>("a.csv", &[]).is_err());
    }

    #[test]
    fn test_file_names() {
        assert_eq!(snapshot_file_name("uniswap_lp", 11272254), "uniswap_lp_11272254.csv");
        assert_eq!(
            ledger_file_name("sushiswap_swaps", 1, 5),
            "sushiswap_swaps_1-5.csv"
        );
    }
}
