//! vaultup-deploy - Deployment library for the vault contract suite.
//!
//! This crate deploys an ordered plan of contracts to an EVM chain over JSON-RPC,
//! feeding the addresses of earlier contracts into the constructors of later ones.
//! The default plan deploys `AuthorizationManager` and then `SecureVault`.
//!
//! # Example
//!
//! ```no_run
//! use vaultup_deploy::{DeployConfig, Orchestrator};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = DeployConfig::load(None)?;
//! let report = Orchestrator::new(config).run().await?;
//! println!("{report}");
//! # Ok(())
//! # }
//! ```

mod artifacts;
pub mod compile;
mod config;
mod deployer;
mod error;
mod network;
mod orchestrator;
mod plan;
pub mod registry;
mod report;
pub mod rpc;
mod sequencer;
mod signer;

pub use artifacts::{ArtifactStore, ContractArtifact};
pub use config::{
    CONFIG_FILENAME, DEFAULT_NETWORK, DEFAULT_RPC_URL, DeployConfig, DeploymentSettings,
    ENV_PREFIX, NetworkConfig,
};
pub use deployer::{ChainDeployer, ContractDeployer};
pub use error::DeployError;
pub use network::NetworkContext;
pub use orchestrator::{Orchestrator, execute};
pub use plan::{
    ConstructorArg, ConstructorValue, DeployedContract, DeploymentPlan, DeploymentRequest,
    DeploymentTarget,
};
pub use registry::{ContractKind, default_plan};
pub use report::DeploymentReport;
pub use sequencer::Sequencer;
pub use signer::SignerIdentity;
