use crate::domain::BlockHeight;
use crate::engine::StakeUnit;
use alloy_primitives::Address;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Well-known Ethereum mainnet contracts.
pub mod mainnet {
    use alloy_primitives::{address, Address};

    pub const OUSD: Address = address!("0x2A8e1E676Ec238d8A992307B495b45B3fEAa5e86");
    pub const UNISWAP_V2_FACTORY: Address = address!("0x5C69bEe701ef814a2B6a3EDD4B1652CB9cc5aA6f");
    pub const SUSHISWAP_FACTORY: Address = address!("0xC0AEe478e3658e2610c5F7A4A2E1777cE9e4f2Ac");
    pub const SUSHISWAP_MASTERCHEF: Address =
        address!("0xc2EdaD668740f1aA35E4D8f227fB8E17dcA888Cd");
    pub const SNOWSWAP_GEYSER: Address = address!("0x7c2Fa8c30DB09e8B3c147Ac67947829447BF07bD");
    pub const WETH: Address = address!("0xC02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");
    pub const USDT: Address = address!("0xdAC17F958D2ee523a2206206994597C13D831ec7");
    pub const USDC: Address = address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");
}

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub output_dir: PathBuf,
    pub address_file: PathBuf,
    pub before_block: BlockHeight,
    pub after_block: BlockHeight,
    pub tracked_token: Address,
    pub worker_pool_size: usize,
    pub rpc_timeout: Duration,
    pub rpc_max_attempts: u32,
    pub rpc_max_in_flight: usize,
    pub log_page_blocks: u64,
    pub omit_zero_lp_rows: bool,
    pub discover_holders: bool,
    pub discovery_start_block: BlockHeight,
    pub uniswap_factory: Address,
    pub uniswap_quote_tokens: Vec<Address>,
    pub sushiswap_factory: Address,
    pub sushiswap_masterchef: Address,
    pub sushiswap_quote_tokens: Vec<Address>,
    pub mooniswap_pools: Vec<Address>,
    pub snowswap_geyser: Option<Address>,
    pub snowswap_stake_unit: StakeUnit,
    pub swap_overrides_file: Option<PathBuf>,
    pub checkpoint_dir: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let rpc_url = required(&env_map, "RPC_URL")?;
        let output_dir = PathBuf::from(required(&env_map, "OUTPUT_DIR")?);
        let address_file = PathBuf::from(required(&env_map, "ADDRESS_FILE")?);

        let before_block = BlockHeight::new(parse_required(&env_map, "BEFORE_BLOCK")?);
        let after_block = BlockHeight::new(parse_required(&env_map, "AFTER_BLOCK")?);
        if after_block <= before_block {
            return Err(ConfigError::InvalidValue(
                "AFTER_BLOCK".to_string(),
                format!(
                    "must be greater than BEFORE_BLOCK ({}), got {}",
                    before_block, after_block
                ),
            ));
        }

        let tracked_token = parse_address_or(&env_map, "TRACKED_TOKEN", mainnet::OUSD)?;

        let worker_pool_size = parse_or::<usize>(&env_map, "WORKER_POOL_SIZE", 4)?;
        if worker_pool_size == 0 {
            return Err(ConfigError::InvalidValue(
                "WORKER_POOL_SIZE".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        let rpc_timeout = Duration::from_secs(parse_or::<u64>(&env_map, "RPC_TIMEOUT_SECS", 30)?);
        let rpc_max_attempts = parse_or::<u32>(&env_map, "RPC_MAX_ATTEMPTS", 5)?;
        if rpc_max_attempts == 0 {
            return Err(ConfigError::InvalidValue(
                "RPC_MAX_ATTEMPTS".to_string(),
                "must be at least 1".to_string(),
            ));
        }
        let rpc_max_in_flight = parse_or::<usize>(&env_map, "RPC_MAX_IN_FLIGHT", 8)?.max(1);
        let log_page_blocks = parse_or::<u64>(&env_map, "LOG_PAGE_BLOCKS", 2000)?.max(1);

        let omit_zero_lp_rows = parse_bool_or(&env_map, "OMIT_ZERO_LP_ROWS", false)?;
        let discover_holders = parse_bool_or(&env_map, "DISCOVER_HOLDERS", true)?;
        let discovery_start_block =
            BlockHeight::new(parse_or::<u64>(&env_map, "DISCOVERY_START_BLOCK", 0)?);

        let uniswap_factory =
            parse_address_or(&env_map, "UNISWAP_FACTORY", mainnet::UNISWAP_V2_FACTORY)?;
        let uniswap_quote_tokens = parse_address_list_or(
            &env_map,
            "UNISWAP_QUOTE_TOKENS",
            vec![mainnet::USDT, mainnet::USDC, mainnet::WETH],
        )?;
        let sushiswap_factory =
            parse_address_or(&env_map, "SUSHISWAP_FACTORY", mainnet::SUSHISWAP_FACTORY)?;
        let sushiswap_masterchef = parse_address_or(
            &env_map,
            "SUSHISWAP_MASTERCHEF",
            mainnet::SUSHISWAP_MASTERCHEF,
        )?;
        let sushiswap_quote_tokens =
            parse_address_list_or(&env_map, "SUSHISWAP_QUOTE_TOKENS", vec![mainnet::USDT])?;
        let mooniswap_pools = parse_address_list_or(&env_map, "MOONISWAP_POOLS", Vec::new())?;

        let snowswap_geyser = match env_map.get("SNOWSWAP_GEYSER").map(|s| s.trim()) {
            None => Some(mainnet::SNOWSWAP_GEYSER),
            Some("") => None,
            Some(raw) => Some(parse_address("SNOWSWAP_GEYSER", raw)?),
        };
        let snowswap_stake_unit = match env_map.get("SNOWSWAP_STAKE_UNIT") {
            None => StakeUnit::Credits,
            Some(raw) => raw.parse::<StakeUnit>().map_err(|e| {
                ConfigError::InvalidValue("SNOWSWAP_STAKE_UNIT".to_string(), e)
            })?,
        };

        let swap_overrides_file = optional_path(&env_map, "SWAP_OVERRIDES_FILE");
        let checkpoint_dir = optional_path(&env_map, "CHECKPOINT_DIR");

        Ok(Config {
            rpc_url,
            output_dir,
            address_file,
            before_block,
            after_block,
            tracked_token,
            worker_pool_size,
            rpc_timeout,
            rpc_max_attempts,
            rpc_max_in_flight,
            log_page_blocks,
            omit_zero_lp_rows,
            discover_holders,
            discovery_start_block,
            uniswap_factory,
            uniswap_quote_tokens,
            sushiswap_factory,
            sushiswap_masterchef,
            sushiswap_quote_tokens,
            mooniswap_pools,
            snowswap_geyser,
            snowswap_stake_unit,
            swap_overrides_file,
            checkpoint_dir,
        })
    }
}

fn required(env_map: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnv(key.to_string()))
}

fn parse_required<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
) -> Result<T, ConfigError> {
    required(env_map, key)?.parse::<T>().map_err(|_| {
        ConfigError::InvalidValue(key.to_string(), "must be a block number".to_string())
    })
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            ConfigError::InvalidValue(key.to_string(), "must be a non-negative integer".to_string())
        }),
    }
}

fn parse_bool_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    match env_map.get(key).map(|s| s.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("must be true or false, got {}", other),
            )),
        },
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address, ConfigError> {
    Address::from_str(raw.trim()).map_err(|e| {
        ConfigError::InvalidValue(key.to_string(), format!("invalid address {}: {}", raw, e))
    })
}

fn parse_address_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Address,
) -> Result<Address, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => parse_address(key, raw),
    }
}

fn parse_address_list_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Vec<Address>,
) -> Result<Vec<Address>, ConfigError> {
    match env_map.get(key) {
        None => Ok(default),
        Some(raw) => raw
            .split(',')
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(|s| parse_address(key, s))
            .collect(),
    }
}

fn optional_path(env_map: &HashMap<String, String>, key: &str) -> Option<PathBuf> {
    env_map
        .get(key)
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// Load the holder address list: one address per line, `#` starts a comment.
///
/// Duplicates (compared case-insensitively) are dropped, keeping first-seen order.
pub fn load_address_file(path: &Path) -> Result<Vec<Address>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        ConfigError::InvalidValue(
            "ADDRESS_FILE".to_string(),
            format!("{}: {}", path.display(), e),
        )
    })?;
    parse_address_list(&content)
}

pub fn parse_address_list(content: &str) -> Result<Vec<Address>, ConfigError> {
    let mut seen = std::collections::HashSet::new();
    let mut addresses = Vec::new();
    for (line_no, line) in content.lines().enumerate() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let address = Address::from_str(line).map_err(|e| {
            ConfigError::InvalidValue(
                "ADDRESS_FILE".to_string(),
                format!("line {}: invalid address {}: {}", line_no + 1, line, e),
            )
        })?;
        if seen.insert(address) {
            addresses.push(address);
        }
    }
    Ok(addresses)
}
