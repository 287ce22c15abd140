//! Hand-authored swap records replacing unreliable on-chain logs.

use crate::domain::{
    BlockHeight, BlockRange, CorrectionFactor, Direction, Market, Provenance, Route, SwapEvent,
    Venue,
};
use crate::error::RunError;
use alloy_primitives::{Address, B256, U256};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// One manual swap record. Amounts are raw, before correction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapOverride {
    pub venue: Venue,
    pub pool: Address,
    pub tx_hash: B256,
    pub block: BlockHeight,
    pub log_index: u64,
    pub in_address: Address,
    pub out_address: Address,
    pub direction: Direction,
    pub tracked_amount: U256,
    pub other_amount: U256,
}

impl SwapOverride {
    /// Build the ledger event for `market`, correcting the tracked leg.
    pub fn to_event(
        &self,
        market: &Market,
        tracked_token: Address,
        factor: &CorrectionFactor,
    ) -> Result<SwapEvent, RunError> {
        let token0_is_tracked = market.token0_is(&tracked_token).ok_or_else(|| {
            RunError::Configuration(format!(
                "override {} targets {} which does not trade {}",
                self.tx_hash,
                market.label(),
                tracked_token
            ))
        })?;
        let other_token = if token0_is_tracked {
            market.token1
        } else {
            market.token0
        };
        let corrected = factor
            .apply(self.tracked_amount)
            .map_err(|e| RunError::DataConsistency(e.to_string()))?;
        let (token0_amount, token1_amount) = if token0_is_tracked {
            (corrected, self.other_amount)
        } else {
            (self.other_amount, corrected)
        };
        let (token_in, token_out) = match self.direction {
            Direction::Sell => (tracked_token, other_token),
            Direction::Buy => (other_token, tracked_token),
        };

        Ok(SwapEvent {
            market: *market,
            block: self.block,
            log_index: self.log_index,
            tx_hash: self.tx_hash,
            in_address: self.in_address,
            out_address: self.out_address,
            direction: self.direction,
            token0_amount,
            token1_amount,
            tracked_amount_raw: self.tracked_amount,
            token_in,
            token_out,
            token0_is_tracked,
            route: Route::Unknown,
            provenance: Provenance::Manual,
        })
    }
}

#[derive(Debug, Deserialize)]
struct OverrideRecord {
    venue: String,
    pool: String,
    tx_hash: String,
    block: u64,
    log_index: u64,
    in_address: String,
    out_address: String,
    direction: String,
    tracked_amount: String,
    other_amount: String,
}

impl OverrideRecord {
    fn parse(self, line: u64) -> Result<SwapOverride, RunError> {
        let bad = |field: &str, value: &str| {
            RunError::Configuration(format!(
                "swap override line {}: invalid {} {:?}",
                line, field, value
            ))
        };
        let address = |field: &str, value: &str| {
            Address::from_str(value.trim()).map_err(|_| bad(field, value))
        };
        let amount = |field: &str, value: &str| {
            U256::from_str_radix(value.trim(), 10).map_err(|_| bad(field, value))
        };

        Ok(SwapOverride {
            venue: Venue::from_str(&self.venue).map_err(|_| bad("venue", &self.venue))?,
            pool: address("pool", &self.pool)?,
            tx_hash: B256::from_str(self.tx_hash.trim()).map_err(|_| bad("tx_hash", &self.tx_hash))?,
            block: BlockHeight::new(self.block),
            log_index: self.log_index,
            in_address: address("in_address", &self.in_address)?,
            out_address: address("out_address", &self.out_address)?,
            direction: Direction::from_str(&self.direction)
                .map_err(|_| bad("direction", &self.direction))?,
            tracked_amount: amount("tracked_amount", &self.tracked_amount)?,
            other_amount: amount("other_amount", &self.other_amount)?,
        })
    }
}

/// Manual swap records keyed by (pool, transaction hash).
#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: BTreeMap<(Address, B256), SwapOverride>,
}

impl OverrideTable {
    pub fn from_records(records: Vec<SwapOverride>) -> Result<Self, RunError> {
        let mut entries = BTreeMap::new();
        for record in records {
            let key = (record.pool, record.tx_hash);
            if entries.insert(key, record).is_some() {
                return Err(RunError::Configuration(format!(
                    "duplicate swap override for pool {} tx {}",
                    key.0, key.1
                )));
            }
        }
        Ok(Self { entries })
    }

    pub fn load(path: &Path) -> Result<Self, RunError> {
        let file = std::fs::File::open(path).map_err(|e| {
            RunError::Configuration(format!("swap overrides {}: {}", path.display(), e))
        })?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, RunError> {
        let mut csv = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut records = Vec::new();
        for (i, row) in csv.deserialize::<OverrideRecord>().enumerate() {
            let line = i as u64 + 2;
            let record = row.map_err(|e| {
                RunError::Configuration(format!("swap override line {}: {}", line, e))
            })?;
            records.push(record.parse(line)?);
        }
        let table = Self::from_records(records)?;
        info!(overrides = table.len(), "Loaded swap overrides");
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the on-chain log of `tx_hash` on `pool` must be ignored.
    pub fn covers(&self, pool: &Address, tx_hash: &B256) -> bool {
        self.entries.contains_key(&(*pool, *tx_hash))
    }

    /// Overrides for `market` whose block lies in `range`.
    pub fn for_market<'a>(
        &'a self,
        market: &'a Market,
        range: &'a BlockRange,
    ) -> impl Iterator<Item = &'a SwapOverride> + 'a {
        self.entries.values().filter(move |o| {
            o.pool == market.pool && o.venue == market.venue && range.contains(o.block.as_u64())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    const POOL: Address = address!("0x00000000000000000000000000000000000000a1");
    const OUSD: Address = address!("0x2a8e1e676ec238d8a992307b495b45b3feaa5e86");
    const USDT: Address = address!("0xdac17f958d2ee523a2206206994597c13d831ec7");

    const CSV: &str = "\
venue,pool,tx_hash,block,log_index,in_address,out_address,direction,tracked_amount,other_amount
uniswap,0x00000000000000000000000000000000000000a1,0x1111111111111111111111111111111111111111111111111111111111111111,150,7,0x000000000000000000000000000000000000a11c,0x000000000000000000000000000000000000a11c,sell,2000,1500
";

    fn market() -> Market {
        Market {
            venue: Venue::Uniswap,
            pool: POOL,
            token0: USDT,
            token1: OUSD,
        }
    }

    #[test]
    fn test_load_from_csv() {
        let table = OverrideTable::from_reader(CSV.as_bytes()).unwrap();
        assert_eq!(table.len(), 1);
        assert!(table.covers(&POOL, &B256::repeat_byte(0x11)));
        assert!(!table.covers(&USDT, &B256::repeat_byte(0x11)));
    }

    #[test]
    fn test_for_market_respects_range() {
        let table = OverrideTable::from_reader(CSV.as_bytes()).unwrap();
        let market = market();
        let inside = BlockRange::new(BlockHeight::new(100), BlockHeight::new(200)).unwrap();
        let outside = BlockRange::new(BlockHeight::new(151), BlockHeight::new(200)).unwrap();
        assert_eq!(table.for_market(&market, &inside).count(), 1);
        assert_eq!(table.for_market(&market, &outside).count(), 0);
    }

    #[test]
    fn test_to_event_corrects_tracked_leg() {
        let table = OverrideTable::from_reader(CSV.as_bytes()).unwrap();
        let market = market();
        let range = BlockRange::new(BlockHeight::new(0), BlockHeight::new(1000)).unwrap();
        let record = table.for_market(&market, &range).next().unwrap();
        let factor = CorrectionFactor::new(U256::from(1u64), U256::from(2u64)).unwrap();

        let event = record.to_event(&market, OUSD, &factor).unwrap();
        assert_eq!(event.provenance, Provenance::Manual);
        assert_eq!(event.route, Route::Unknown);
        assert!(!event.token0_is_tracked);
        assert_eq!(event.token1_amount, U256::from(1000u64));
        assert_eq!(event.token0_amount, U256::from(1500u64));
        assert_eq!(event.tracked_amount_raw, U256::from(2000u64));
        assert_eq!(event.token_in, OUSD);
        assert!(event.has_single_tracked_leg());
    }

    #[test]
    fn test_bad_direction_rejected() {
        let csv = CSV.replace(",sell,", ",hold,");
        let err = OverrideTable::from_reader(csv.as_bytes()).unwrap_err();
        assert!(err.to_string().contains("direction"));
    }
}
