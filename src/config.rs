use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

use crate::blockchain::LedgerConfig;

const HOST_KEY: &str = "PANA_HOST";
const PORT_KEY: &str = "PORT";
const DATA_DIR_KEY: &str = "PANA_DATA_DIR";
const STORE_KEY: &str = "PANA_STORE";
const DIFFICULTY_KEY: &str = "PANA_DIFFICULTY";
const MINING_REWARD_KEY: &str = "PANA_MINING_REWARD";

/// Errors that can occur while reading node settings
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// Which persistence backend the node writes its chain to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// `chain.json` under the data directory
    Json,
    /// A sled database under the data directory
    Sled,
}

impl FromStr for StoreKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(StoreKind::Json),
            "sled" => Ok(StoreKind::Sled),
            _ => Err(()),
        }
    }
}

/// Settings for the HTTP node
#[derive(Debug, Clone, PartialEq)]
pub struct NodeSettings {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub ledger: LedgerConfig,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            data_dir: PathBuf::from("data"),
            store: StoreKind::Json,
            ledger: LedgerConfig::default(),
        }
    }
}

impl NodeSettings {
    /// Reads settings from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Reads settings through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let raw = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let host = raw(HOST_KEY).unwrap_or(defaults.host);
        let port = parse_or(PORT_KEY, raw(PORT_KEY), defaults.port)?;
        let data_dir = raw(DATA_DIR_KEY)
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);
        let store = parse_or(STORE_KEY, raw(STORE_KEY), defaults.store)?;
        let difficulty = parse_or(DIFFICULTY_KEY, raw(DIFFICULTY_KEY), defaults.ledger.difficulty)?;
        let mining_reward: f64 = parse_or(
            MINING_REWARD_KEY,
            raw(MINING_REWARD_KEY),
            defaults.ledger.mining_reward,
        )?;

        // Hashes are 64 hex digits; more leading zeros can never be found.
        if difficulty > 64 {
            return Err(ConfigError::Invalid {
                key: DIFFICULTY_KEY,
                value: difficulty.to_string(),
            });
        }
        if !mining_reward.is_finite() || mining_reward < 0.0 {
            return Err(ConfigError::Invalid {
                key: MINING_REWARD_KEY,
                value: mining_reward.to_string(),
            });
        }

        Ok(Self {
            host,
            port,
            data_dir,
            store,
            ledger: LedgerConfig {
                difficulty,
                mining_reward,
            },
        })
    }
}

fn parse_or<T: FromStr>(key: &'static str, raw: Option<String>, default: T) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => match value.trim().parse() {
            Ok(parsed) => Ok(parsed),
            Err(_) => Err(ConfigError::Invalid { key, value }),
        },
    }
}
