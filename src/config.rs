//! Configuration for the transaction relay core
//!
//! Loads settings from TOML files with environment variable substitution.
//! Every policy knob has a default matching production-safe values, so a
//! minimal config only needs the chain section.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::path::{Path, PathBuf};

const GWEI: u128 = 1_000_000_000;

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub chain: ChainConfig,
    #[serde(default)]
    pub gas: GasConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub preflight: PreflightConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    /// Whether the chain supports EIP-1559 fee-market pricing
    #[serde(default = "default_true")]
    pub supports_eip1559: bool,
    /// Receipt polling interval while waiting for confirmation
    #[serde(default = "default_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,
    /// Upper bound on a single confirmation wait
    #[serde(default = "default_confirmation_timeout_secs")]
    pub confirmation_timeout_secs: u64,
}

/// Gas pricing knobs for both strategies
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GasConfig {
    /// Legacy strategy: multiplier applied to the node's gas price
    pub legacy_multiplier: f64,
    /// Market strategy: fee-history window in blocks
    pub fee_history_blocks: u64,
    /// Market strategy: reward percentile sampled from fee history
    pub reward_percentile: f64,
    /// Market strategy: multiplier applied to the median sampled reward
    pub priority_fee_multiplier: f64,
    /// Market strategy: base fee headroom multiplier
    pub base_fee_multiplier: f64,
    pub min_priority_fee_wei: u128,
    pub max_priority_fee_wei: u128,
    /// Hard ceiling on max fee per gas; always wins over network conditions
    pub max_total_fee_wei: u128,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            legacy_multiplier: 1.0,
            fee_history_blocks: 20,
            reward_percentile: 50.0,
            priority_fee_multiplier: 1.5,
            base_fee_multiplier: 2.0,
            min_priority_fee_wei: 1,
            max_priority_fee_wei: 500 * GWEI,
            max_total_fee_wei: 1000 * GWEI,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PreflightConfig {
    pub enabled: bool,
    /// When set, the balance check compares against this instead of the
    /// transaction's own cost
    pub min_balance_wei: Option<u128>,
}

impl Default for PreflightConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_balance_wei: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_confirmation_timeout_secs() -> u64 {
    120
}

impl Settings {
    /// Load settings from the configured TOML file
    ///
    /// The path comes from `TX_RELAYER_CONFIG`, falling back to
    /// `config/default.toml`.
    pub fn load() -> Result<Self> {
        let config_path = env::var("TX_RELAYER_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));
        Self::load_from(&config_path)
    }

    /// Load settings from a specific TOML file
    pub fn load_from(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        // Substitute environment variables
        let config_str = substitute_env_vars(&config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chain.rpc_urls.is_empty() {
            anyhow::bail!("Chain {} has no RPC URLs configured", self.chain.name);
        }
        if self.retry.max_attempts == 0 {
            anyhow::bail!("retry.max_attempts must be at least 1");
        }
        if !(0.0..=100.0).contains(&self.gas.reward_percentile) {
            anyhow::bail!("gas.reward_percentile must be within 0..=100");
        }
        // A non-positive multiplier would truncate to a zero fee bid.
        for (name, value) in [
            ("gas.legacy_multiplier", self.gas.legacy_multiplier),
            ("gas.priority_fee_multiplier", self.gas.priority_fee_multiplier),
            ("gas.base_fee_multiplier", self.gas.base_fee_multiplier),
        ] {
            if !(value > 0.0) {
                anyhow::bail!("{} must be positive, got {}", name, value);
            }
        }
        if self.gas.min_priority_fee_wei > self.gas.max_priority_fee_wei {
            anyhow::bail!("gas.min_priority_fee_wei exceeds gas.max_priority_fee_wei");
        }
        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();
    let re = regex::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();

    for cap in re.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_env_var_substitution() {
        env::set_var("TEST_RPC_KEY", "abc123");
        let input = "url = \"https://rpc.example.com/${TEST_RPC_KEY}\"";
        let result = substitute_env_vars(input);
        assert_eq!(result, "url = \"https://rpc.example.com/abc123\"");
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [chain]
            chain_id = 11155111
            name = "sepolia"
            rpc_urls = ["https://rpc.sepolia.org"]
            "#
        )
        .unwrap();

        let settings = Settings::load_from(file.path()).unwrap();
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay_ms, 1000);
        assert_eq!(settings.gas.fee_history_blocks, 20);
        assert_eq!(settings.gas.max_priority_fee_wei, 500 * GWEI);
        assert!(settings.preflight.enabled);
        assert!(settings.chain.supports_eip1559);
    }

    #[test]
    fn rejects_empty_rpc_urls() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [chain]
            chain_id = 1
            name = "mainnet"
            rpc_urls = []
            "#
        )
        .unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn rejects_non_positive_multipliers() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [chain]
            chain_id = 1
            name = "mainnet"
            rpc_urls = ["https://eth.example.com"]

            [gas]
            priority_fee_multiplier = -1.5
            "#
        )
        .unwrap();

        let err = Settings::load_from(file.path()).unwrap_err();
        assert!(err.to_string().contains("priority_fee_multiplier"));
    }

    #[test]
    fn rejects_zero_legacy_multiplier() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [chain]
            chain_id = 1
            name = "mainnet"
            rpc_urls = ["https://eth.example.com"]

            [gas]
            legacy_multiplier = 0.0
            "#
        )
        .unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }

    #[test]
    fn rejects_zero_max_attempts() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
            [chain]
            chain_id = 1
            name = "mainnet"
            rpc_urls = ["https://eth.example.com"]

            [retry]
            max_attempts = 0
            "#
        )
        .unwrap();

        assert!(Settings::load_from(file.path()).is_err());
    }
}
