//! Per-network settings and the development-network switch.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::devnet::DevnetConfig;

/// Networks on which mocks are deployed and unit suites run.
pub const DEVELOPMENT_CHAINS: [&str; 2] = ["hardhat", "localhost"];
pub const DECIMALS: u8 = 8;
pub const INITIAL_ANSWER: i128 = 180_000_000_000;
/// Largest feed precision whose scale `10^decimals` fits in a `u128`.
pub const MAX_DECIMALS: u8 = 38;

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const BNB_CHAIN_ID: u64 = 56;

// Evaluated at compile time, a bad digit fails the build.
const SEPOLIA_ETH_USD_FEED: Address =
    Address::from_bytes(hex_lit(b"694aa1769357215de4fac081bf1f309adc325306"));
const BNB_ETH_USD_FEED: Address =
    Address::from_bytes(hex_lit(b"9ef1b8c0e4f7dc8bf5719ea496883dc6401d5b2e"));

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("unknown network {0:?}")]
    UnknownNetwork(String),
    #[error("mock feed decimals {0} exceed the maximum of 38")]
    MockDecimals(u8),
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkSettings {
    pub name: String,
    /// `None` means the price feed is supplied by a locally deployed mock.
    #[serde(rename = "ethUsdPriceFeed", default)]
    pub eth_usd_price_feed: Option<Address>,
}

impl NetworkSettings {
    pub fn local(name: &str) -> Self {
        NetworkSettings {
            name: name.to_string(),
            eth_usd_price_feed: None,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MockSettings {
    pub decimals: u8,
    pub initial_answer: i128,
}

impl Default for MockSettings {
    fn default() -> Self {
        MockSettings {
            decimals: DECIMALS,
            initial_answer: INITIAL_ANSWER,
        }
    }
}

/// Everything the harness needs to know about its environment.
///
/// Passed in explicitly at startup; fields missing from a config file keep their defaults.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, rename_all = "camelCase")]
pub struct HarnessConfig {
    pub networks: BTreeMap<u64, NetworkSettings>,
    pub development_chains: Vec<String>,
    pub mock: MockSettings,
    pub devnet: DevnetConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            SEPOLIA_CHAIN_ID,
            NetworkSettings {
                name: "sepolia".into(),
                eth_usd_price_feed: Some(SEPOLIA_ETH_USD_FEED),
            },
        );
        networks.insert(
            BNB_CHAIN_ID,
            NetworkSettings {
                name: "bnb".into(),
                eth_usd_price_feed: Some(BNB_ETH_USD_FEED),
            },
        );
        HarnessConfig {
            networks,
            development_chains: DEVELOPMENT_CHAINS.iter().map(|s| s.to_string()).collect(),
            mock: MockSettings::default(),
            devnet: DevnetConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: HarnessConfig = serde_json::from_str(json)?;
        if config.mock.decimals > MAX_DECIMALS {
            return Err(ConfigError::MockDecimals(config.mock.decimals));
        }
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::debug!("loaded harness config from {}", path.display());
        Ok(config)
    }

    /// Loads `path` if given, otherwise returns the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Settings for `chain_id`. Unlisted chains get a null price feed.
    pub fn lookup(&self, chain_id: u64) -> NetworkSettings {
        match self.networks.get(&chain_id) {
            Some(settings) => settings.clone(),
            None => {
                log::debug!(
                    "chain {} not configured, price feed comes from a local mock",
                    chain_id
                );
                NetworkSettings::local("unlisted")
            }
        }
    }

    pub fn is_development(&self, network: &str) -> bool {
        self.development_chains.iter().any(|name| name == network)
    }

    /// Settings for a network by name.
    ///
    /// Development networks always resolve, with a null price feed.
    pub fn resolve(&self, network: &str) -> Result<NetworkSettings, ConfigError> {
        if self.is_development(network) {
            return Ok(NetworkSettings::local(network));
        }
        self.networks
            .values()
            .find(|settings| settings.name == network)
            .cloned()
            .ok_or_else(|| ConfigError::UnknownNetwork(network.to_string()))
    }
}

const fn hex_lit(digits: &[u8; 40]) -> [u8; 20] {
    const fn nibble(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'a'..=b'f' => c - b'a' + 10,
            _ => panic!("invalid hex digit"),
        }
    }
    let mut out = [0u8; 20];
    let mut i = 0;
    while i < 20 {
        out[i] = (nibble(digits[2 * i]) << 4) | nibble(digits[2 * i + 1]);
        i += 1;
    }
    out
}
