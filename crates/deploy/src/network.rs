//! Resolution of the chain and signing identity a run deploys with.

use alloy_core::primitives::Address;
use anyhow::Context;

use crate::{DeployError, NetworkConfig, SignerIdentity, rpc::RpcClient};

/// The chain and account a deployment runs against.
#[derive(Debug, Clone)]
pub struct NetworkContext {
    /// Name of the configured network (e.g. `localhost`, `sepolia`).
    pub network_name: String,
    /// Chain id reported by the endpoint.
    pub chain_id: u64,
    /// The account signing deployments.
    pub signer: SignerIdentity,
}

impl NetworkContext {
    /// Query the endpoint for its chain id and establish the signing identity.
    ///
    /// A configured private key wins over a mnemonic; with neither, the node's
    /// own account at `account_index` is used.
    pub async fn resolve(
        network_name: &str,
        config: &NetworkConfig,
        rpc: &RpcClient,
    ) -> Result<Self, DeployError> {
        let chain_id = rpc
            .chain_id()
            .await
            .with_context(|| format!("Could not connect to network '{}' at {}", network_name, rpc.url()))
            .map_err(DeployError::environment)?;

        if let Some(expected) = config.chain_id {
            if expected != chain_id {
                return Err(DeployError::Environment(format!(
                    "network '{}' expects chain id {}, but {} reports {}",
                    network_name,
                    expected,
                    rpc.url(),
                    chain_id
                )));
            }
        }

        let signer = Self::signer(config, rpc)
            .await
            .map_err(DeployError::environment)?;

        Ok(Self {
            network_name: network_name.to_string(),
            chain_id,
            signer,
        })
    }

    async fn signer(config: &NetworkConfig, rpc: &RpcClient) -> Result<SignerIdentity, anyhow::Error> {
        if let Some(key) = &config.private_key {
            return SignerIdentity::from_private_key(key);
        }
        if let Some(phrase) = &config.mnemonic {
            return SignerIdentity::from_mnemonic(phrase, config.account_index);
        }

        let accounts: Vec<Address> = rpc
            .call_with_retry("eth_accounts", vec![])
            .await
            .context("Failed to list node accounts")?;

        tracing::debug!(count = accounts.len(), "No key configured, using node accounts");

        accounts
            .get(config.account_index as usize)
            .copied()
            .map(SignerIdentity::Node)
            .with_context(|| {
                format!(
                    "No signing identity configured: set a private key or mnemonic (the node exposes {} account(s), index {} requested)",
                    accounts.len(),
                    config.account_index
                )
            })
    }

    /// Address of the deploying account.
    pub fn deployer(&self) -> Address {
        self.signer.address()
    }
}
