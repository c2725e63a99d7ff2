use std::path::PathBuf;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use vaultup_deploy::DeployConfig;

#[derive(Parser)]
#[command(name = "vaultup")]
#[command(
    author,
    version,
    about = "Deploy the AuthorizationManager and SecureVault contracts in dependency order"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, env = "VAULTUP_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a Vaultup.toml configuration file, or to the directory holding it.
    ///
    /// If not provided, ./Vaultup.toml is used when it exists.
    #[arg(long, alias = "conf", env = "VAULTUP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Name of the network to deploy to, as declared under [networks.<name>].
    ///
    /// Defaults to `localhost` (http://127.0.0.1:8545).
    #[arg(short, long, env = "VAULTUP_NETWORK")]
    pub network: Option<String>,

    /// Override the JSON-RPC endpoint of the selected network.
    #[arg(long, alias = "rpc", env = "VAULTUP_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Hex private key of the deployer account.
    ///
    /// If neither a key nor a mnemonic is configured, the node's first unlocked account is used.
    #[arg(long, env = "VAULTUP_PRIVATE_KEY", hide_env_values = true)]
    pub private_key: Option<String>,

    /// Directory holding the compiled contract artifacts.
    #[arg(long, env = "VAULTUP_ARTIFACTS")]
    pub artifacts: Option<PathBuf>,

    /// Maximum time in seconds to wait for each deployment to be confirmed.
    #[arg(long, env = "VAULTUP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Write the deployment report as JSON to this path.
    #[arg(long, env = "VAULTUP_REPORT")]
    pub report: Option<PathBuf>,
}

impl Cli {
    /// Apply command line overrides on top of the loaded configuration.
    pub fn apply(&self, config: &mut DeployConfig) {
        if let Some(network) = &self.network {
            config.network = network.clone();
        }
        if let Some(url) = &self.rpc_url {
            config.selected_network_mut().url = url.clone();
        }
        if let Some(key) = &self.private_key {
            config.selected_network_mut().private_key = Some(key.clone());
        }
        if let Some(artifacts) = &self.artifacts {
            config.artifacts = artifacts.clone();
        }
        if let Some(timeout) = self.timeout {
            config.deployment.timeout_secs = timeout;
        }
        if let Some(report) = &self.report {
            config.report = Some(report.clone());
        }
    }
}
