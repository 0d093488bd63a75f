//! Configuration management for the bundle relayer
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use ethers::types::Address;
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub network: NetworkConfig,
    pub contracts: ContractsConfig,
    pub identities: IdentitiesConfig,
    pub relay: RelayConfig,
    #[serde(default)]
    pub bundle: BundleConfig,
    #[serde(default)]
    pub batch: BatchConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContractsConfig {
    pub bundler_address: String,
    pub token_address: String,
}

/// Hex private keys for the two transacting identities
#[derive(Clone, Deserialize)]
pub struct IdentitiesConfig {
    pub contract_signer_key: String,
    pub token_signer_key: String,
}

impl std::fmt::Debug for IdentitiesConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentitiesConfig").finish_non_exhaustive()
    }
}

#[derive(Clone, Deserialize)]
pub struct RelayConfig {
    pub url: String,
    /// Reputation key for relay authentication. Empty means a random key per run.
    #[serde(default)]
    pub auth_key: String,
    /// Query `flashbots_getUserStatsV2` instead of the v1 statistics call
    #[serde(default)]
    pub user_stats_v2: bool,
    /// Run `eth_callBundle` before the first submission
    #[serde(default)]
    pub simulate: bool,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl std::fmt::Debug for RelayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayConfig")
            .field("url", &self.url)
            .field("user_stats_v2", &self.user_stats_v2)
            .field("simulate", &self.simulate)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish_non_exhaustive()
    }
}

impl RelayConfig {
    pub fn auth_key(&self) -> Option<&str> {
        let key = self.auth_key.trim();
        (!key.is_empty()).then_some(key)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BundleConfig {
    /// Offset from the chain head of the first target block
    pub blocks_in_future: u64,
    pub legacy_gas_price_gwei: u64,
    /// Additional blocks attempted after the first target passes
    pub max_block_retries: u32,
    /// Gas price increase per retry; 0 resubmits the identical signed bundle
    pub gas_price_bump_percent: u64,
    pub poll_interval_ms: u64,
    pub open_trading_gas_limit: u64,
    pub swap_gas_limit: u64,
    pub swap_fee_eth: String,
    /// Upper bound accepted for `--eth`
    pub max_eth_amount: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            blocks_in_future: 2,
            legacy_gas_price_gwei: 24,
            max_block_retries: 5,
            gas_price_bump_percent: 0,
            poll_interval_ms: 1_000,
            open_trading_gas_limit: 2_200_000,
            swap_gas_limit: 4_000_000,
            swap_fee_eth: "0.005".to_string(),
            max_eth_amount: "1000".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub gas_price_gwei: u64,
    pub confirmations: usize,
    /// Upper bound accepted for `--amount`
    pub max_amount: String,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            gas_price_gwei: 100,
            confirmations: 1,
            max_amount: "100".to_string(),
        }
    }
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Settings {
    /// Load settings from the configured file
    ///
    /// Resolution order: explicit path, `BUNDLER_CONFIG`, `config/default.toml`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => path.to_path_buf(),
            None => env::var("BUNDLER_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("config/default.toml")),
        };

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::from_toml(&config_str)
    }

    /// Load settings for a named network preset
    pub fn load_network(network: &str) -> Result<Self> {
        let config_path = PathBuf::from(format!("config/{}.toml", network));
        Self::load(Some(&config_path))
    }

    /// Parse settings from TOML text, substituting `${VAR}` references first
    pub fn from_toml(input: &str) -> Result<Self> {
        let config_str = substitute_env_vars(input);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.network.rpc_urls.iter().all(|u| u.trim().is_empty()) {
            anyhow::bail!("Network {} has no RPC URLs configured", self.network.name);
        }

        self.bundler_address()?;
        self.token_address()?;

        if self.identities.contract_signer_key.trim().is_empty() {
            anyhow::bail!("Contract signer key is not configured");
        }
        if self.identities.token_signer_key.trim().is_empty() {
            anyhow::bail!("Token signer key is not configured");
        }

        if self.relay.url.trim().is_empty() {
            anyhow::bail!("Relay URL is not configured");
        }

        if self.bundle.blocks_in_future == 0 {
            anyhow::bail!("bundle.blocks_in_future must be at least 1");
        }
        if self.bundle.legacy_gas_price_gwei == 0 {
            anyhow::bail!("bundle.legacy_gas_price_gwei must be positive");
        }
        if self.bundle.gas_price_bump_percent > 100 {
            anyhow::bail!("bundle.gas_price_bump_percent must not exceed 100");
        }
        if self.batch.confirmations == 0 {
            anyhow::bail!("batch.confirmations must be at least 1");
        }

        if self.relay.auth_key().is_none() {
            tracing::warn!("No relay auth key configured - a random key will be used");
        }

        Ok(())
    }

    pub fn bundler_address(&self) -> Result<Address> {
        self.contracts
            .bundler_address
            .parse()
            .with_context(|| format!("Invalid bundler address: {}", self.contracts.bundler_address))
    }

    pub fn token_address(&self) -> Result<Address> {
        self.contracts
            .token_address
            .parse()
            .with_context(|| format!("Invalid token address: {}", self.contracts.token_address))
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("static regex");

    re.replace_all(input, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    })
    .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[network]
chain_id = 11155111
name = "sepolia"
rpc_urls = ["http://127.0.0.1:8545"]

[contracts]
bundler_address = "0xb79abF45Ae81456104b3b71f67C967da23093E9e"
token_address = "0x94Af502a5583d37a9da1b738A19Cc8D02fA4D402"

[identities]
contract_signer_key = "${BUNDLER_TEST_CONTRACT_KEY}"
token_signer_key = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d"

[relay]
url = "https://relay-sepolia.flashbots.net"
auth_key = "${BUNDLER_TEST_UNSET_AUTH_KEY}"
"#;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_VAR", "test_value");
        let input = "url = \"https://api.example.com/${TEST_VAR}/endpoint\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://api.example.com/test_value/endpoint\"");
    }

    #[test]
    fn test_load_applies_defaults_and_substitution() {
        env::set_var(
            "BUNDLER_TEST_CONTRACT_KEY",
            "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80",
        );
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();

        assert_eq!(settings.network.chain_id, 11155111);
        assert!(settings.identities.contract_signer_key.starts_with("0xac09"));
        assert_eq!(settings.relay.auth_key(), None);
        assert_eq!(settings.bundle.blocks_in_future, 2);
        assert_eq!(settings.bundle.legacy_gas_price_gwei, 24);
        assert_eq!(settings.bundle.gas_price_bump_percent, 0);
        assert_eq!(settings.batch.gas_price_gwei, 100);
        assert_eq!(settings.batch.confirmations, 1);
    }

    #[test]
    fn test_rejects_invalid_contract_address() {
        let broken = SAMPLE
            .replace("${BUNDLER_TEST_CONTRACT_KEY}", "0x01")
            .replace("0xb79abF45Ae81456104b3b71f67C967da23093E9e", "not-an-address");
        assert!(Settings::from_toml(&broken).is_err());
    }

    #[test]
    fn test_rejects_zero_block_offset() {
        let sample = SAMPLE.replace("${BUNDLER_TEST_CONTRACT_KEY}", "0x01");
        let broken = format!("{}\n[bundle]\nblocks_in_future = 0\n", sample);
        assert!(Settings::from_toml(&broken).is_err());
    }
}
