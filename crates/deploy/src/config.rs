//! Deployment configuration.
//!
//! Values are layered with figment: built-in defaults, then a `Vaultup.toml` file,
//! then `VAULTUP_*` environment variables (`__` separates nested keys). The binary
//! applies its command line overrides on top of the result.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::{DeployError, DeploymentTarget};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "Vaultup.toml";

/// Prefix of the environment variables read by [`DeployConfig::load`].
pub const ENV_PREFIX: &str = "VAULTUP_";

/// Name of the network selected when none is configured.
pub const DEFAULT_NETWORK: &str = "localhost";

/// RPC endpoint of the built-in `localhost` network.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Top-level configuration of a deployment run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// Name of the network to deploy to, a key of `networks`.
    pub network: String,
    /// Directory holding the compiled contract artifacts.
    pub artifacts: PathBuf,
    /// Command to run before reading artifacts, e.g. `["forge", "build"]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compile: Option<Vec<String>>,
    /// Where to write the JSON deployment report (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<PathBuf>,
    /// Confirmation and transaction settings.
    #[serde(default)]
    pub deployment: DeploymentSettings,
    /// Known networks, by name.
    #[serde(default)]
    pub networks: BTreeMap<String, NetworkConfig>,
    /// Contracts to deploy, in order. Empty means the default plan.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plan: Vec<DeploymentTarget>,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            network: DEFAULT_NETWORK.to_string(),
            artifacts: PathBuf::from("artifacts"),
            compile: None,
            report: None,
            deployment: DeploymentSettings::default(),
            networks: BTreeMap::from([(DEFAULT_NETWORK.to_string(), NetworkConfig::default())]),
            plan: Vec::new(),
        }
    }
}

impl DeployConfig {
    /// Load the layered configuration.
    ///
    /// `path` may point to a file or to a directory containing [`CONFIG_FILENAME`].
    /// Without a path, `./Vaultup.toml` is read when it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!(
                        "Configuration file or directory not found: {}",
                        path.display()
                    );
                }
                if path.is_dir() {
                    path.join(CONFIG_FILENAME)
                } else {
                    path.to_path_buf()
                }
            }
            None => PathBuf::from(CONFIG_FILENAME),
        };

        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

        tracing::debug!(path = %config_path.display(), network = %config.network, "Configuration loaded");
        Ok(config)
    }

    /// The selected network and its settings.
    pub fn selected_network(&self) -> Result<(&str, &NetworkConfig), DeployError> {
        self.networks
            .get(&self.network)
            .map(|network| (self.network.as_str(), network))
            .ok_or_else(|| {
                DeployError::Environment(format!(
                    "network '{}' is not configured (known networks: {})",
                    self.network,
                    self.networks.keys().cloned().collect::<Vec<_>>().join(", ")
                ))
            })
    }

    /// Mutable settings of the selected network, created with defaults if missing.
    pub fn selected_network_mut(&mut self) -> &mut NetworkConfig {
        self.networks.entry(self.network.clone()).or_default()
    }
}

/// Connection and signing settings of one network.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint.
    pub url: String,
    /// Expected chain id; the run aborts if the endpoint reports another one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    /// Hex private key of the deployer account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<String>,
    /// BIP-39 mnemonic of the deployer account, used when no private key is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic: Option<String>,
    /// Account index, into the mnemonic or into the node's accounts.
    #[serde(default)]
    pub account_index: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RPC_URL.to_string(),
            chain_id: None,
            private_key: None,
            mnemonic: None,
            account_index: 0,
        }
    }
}

impl fmt::Debug for NetworkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NetworkConfig")
            .field("url", &self.url)
            .field("chain_id", &self.chain_id)
            .field("private_key", &self.private_key.as_ref().map(|_| "<redacted>"))
            .field("mnemonic", &self.mnemonic.as_ref().map(|_| "<redacted>"))
            .field("account_index", &self.account_index)
            .finish()
    }
}

/// How transactions are built and how long confirmations are awaited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    /// Maximum time to wait for one contract to be confirmed.
    pub timeout_secs: u64,
    /// Delay between two receipt polls.
    pub poll_interval_ms: u64,
    /// Number of blocks, including the inclusion block, before a deployment counts as final.
    pub confirmations: u64,
    /// Gas limit as a percentage of the node's estimate.
    pub gas_multiplier_percent: u64,
    /// Send pre-EIP-1559 transactions.
    pub legacy: bool,
    /// Timeout of a single RPC request.
    pub rpc_timeout_secs: u64,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            poll_interval_ms: 1000,
            confirmations: 1,
            gas_multiplier_percent: 120,
            legacy: false,
            rpc_timeout_secs: 30,
        }
    }
}

impl DeploymentSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Scale a gas estimate by the configured multiplier.
    pub fn gas_limit(&self, estimate: u64) -> u64 {
        estimate.saturating_mul(self.gas_multiplier_percent) / 100
    }
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;
    use crate::ConstructorArg;

    #[test]
    fn test_defaults() {
        Jail::expect_with(|_jail| {
            let config = DeployConfig::load(None).expect("defaults should load");
            assert_eq!(config, DeployConfig::default());

            let (name, network) = config.selected_network().unwrap();
            assert_eq!(name, "localhost");
            assert_eq!(network.url, DEFAULT_RPC_URL);
            assert!(network.private_key.is_none());
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_layering() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILENAME,
                r#"
                network = "sepolia"
                artifacts = "out"
                compile = ["forge", "build"]

                [deployment]
                confirmations = 2

                [networks.sepolia]
                url = "https://ethereum-sepolia-rpc.publicnode.com"
                chain_id = 11155111

                [[plan]]
                name = "AuthorizationManager"
                args = ["$deployer"]

                [[plan]]
                name = "SecureVault"
                args = ["@AuthorizationManager"]
                "#,
            )?;
            jail.set_env("VAULTUP_DEPLOYMENT__TIMEOUT_SECS", "42");
            jail.set_env("VAULTUP_NETWORKS__SEPOLIA__ACCOUNT_INDEX", "3");

            let config = DeployConfig::load(None).expect("config should load");
            assert_eq!(config.network, "sepolia");
            assert_eq!(config.artifacts, PathBuf::from("out"));
            assert_eq!(
                config.compile,
                Some(vec!["forge".to_string(), "build".to_string()])
            );
            assert_eq!(config.deployment.confirmations, 2);
            assert_eq!(config.deployment.timeout_secs, 42);
            // Untouched settings keep their defaults.
            assert_eq!(config.deployment.poll_interval_ms, 1000);

            // The built-in localhost network survives the merge.
            assert!(config.networks.contains_key("localhost"));
            let (_, sepolia) = config.selected_network().unwrap();
            assert_eq!(sepolia.chain_id, Some(11155111));
            assert_eq!(sepolia.account_index, 3);

            assert_eq!(config.plan.len(), 2);
            assert_eq!(
                config.plan[1].args,
                vec![ConstructorArg::AddressOf("AuthorizationManager".to_string())]
            );
            Ok(())
        });
    }

    #[test]
    fn test_load_from_directory() {
        Jail::expect_with(|jail| {
            std::fs::create_dir("deploy").expect("create dir");
            jail.create_file(
                Path::new("deploy").join(CONFIG_FILENAME),
                r#"artifacts = "build/artifacts""#,
            )?;

            let config = DeployConfig::load(Some(Path::new("deploy"))).expect("config should load");
            assert_eq!(config.artifacts, PathBuf::from("build/artifacts"));
            assert!(DeployConfig::load(Some(Path::new("missing.toml"))).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_unknown_network() {
        let config = DeployConfig {
            network: "mainnet".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.selected_network(),
            Err(DeployError::Environment(_))
        ));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let network = NetworkConfig {
            private_key: Some("0xdeadbeef".to_string()),
            mnemonic: Some("test test junk".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", network);
        assert!(!debug.contains("deadbeef"));
        assert!(!debug.contains("junk"));
        assert!(debug.contains("<redacted>"));
    }

    #[test]
    fn test_gas_limit_multiplier() {
        let settings = DeploymentSettings::default();
        assert_eq!(settings.gas_limit(100_000), 120_000);
    }
}
