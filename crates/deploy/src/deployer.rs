//! Contract deployment over JSON-RPC.

use std::future::Future;

use alloy_consensus::{TxEip1559, TxLegacy};
use alloy_core::primitives::{Address, B256, Bytes, TxKind, U256};
use anyhow::Context;
use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::{
    ArtifactStore, ContractKind, DeployError, DeployedContract, DeploymentRequest,
    DeploymentSettings, NetworkContext, SignerIdentity,
    rpc::{self, PollError, RpcClient},
    signer::{CreationTx, sign_creation},
};

/// Priority fee used when the node does not implement `eth_maxPriorityFeePerGas`.
const FALLBACK_PRIORITY_FEE: u128 = 1_000_000_000;

/// Something able to put a contract on-chain.
///
/// Each call creates a new contract instance: deployments are not idempotent.
pub trait ContractDeployer: Send + Sync {
    /// Deploy one contract and wait until it is confirmed.
    fn deploy(
        &self,
        request: &DeploymentRequest,
    ) -> impl Future<Output = Result<DeployedContract, DeployError>> + Send;
}

/// Subset of a transaction receipt needed to confirm a deployment.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Receipt {
    #[serde(deserialize_with = "rpc::deserialize_u64_from_hex")]
    block_number: u64,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    status: Option<String>,
}

impl Receipt {
    fn succeeded(&self) -> bool {
        // Pre-byzantium receipts have no status field.
        self.status.as_deref().is_none_or(|status| status == "0x1")
    }
}

/// [`ContractDeployer`] that sends creation transactions to a JSON-RPC endpoint.
#[derive(Debug, Clone)]
pub struct ChainDeployer {
    rpc: RpcClient,
    chain_id: u64,
    signer: SignerIdentity,
    artifacts: ArtifactStore,
    settings: DeploymentSettings,
    cancel: CancellationToken,
}

impl ChainDeployer {
    pub fn new(
        rpc: RpcClient,
        context: &NetworkContext,
        artifacts: ArtifactStore,
        settings: DeploymentSettings,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            rpc,
            chain_id: context.chain_id,
            signer: context.signer.clone(),
            artifacts,
            settings,
            cancel,
        }
    }

    /// Load the artifact and build the creation calldata for `request`.
    fn creation_code(&self, request: &DeploymentRequest) -> Result<Bytes, DeployError> {
        let artifact = self.artifacts.load(&request.name)?;
        if let Ok(kind) = request.name.parse::<ContractKind>() {
            kind.check_artifact(&artifact)?;
        }
        let args = artifact.encode_args(&request.args)?;
        Ok(artifact.creation_code(&args))
    }

    async fn estimate_gas(&self, from: Address, data: &Bytes) -> Result<u64, anyhow::Error> {
        let estimate: String = self
            .rpc
            .call(
                "eth_estimateGas",
                vec![json!({ "from": from, "data": data })],
            )
            .await
            .context("Failed to estimate gas (does the constructor revert?)")?;
        Ok(self.settings.gas_limit(rpc::parse_quantity(&estimate)?))
    }

    /// Submit the creation transaction and return its hash.
    async fn submit(&self, data: Bytes) -> Result<B256, anyhow::Error> {
        let from = self.signer.address();
        let gas_limit = self.estimate_gas(from, &data).await?;

        let SignerIdentity::Local(signer) = &self.signer else {
            return self
                .rpc
                .call(
                    "eth_sendTransaction",
                    vec![json!({
                        "from": from,
                        "data": data,
                        "gas": format!("0x{:x}", gas_limit),
                    })],
                )
                .await
                .context("Failed to send deployment transaction");
        };

        let nonce: String = self
            .rpc
            .call_with_retry("eth_getTransactionCount", vec![json!(from), json!("pending")])
            .await
            .context("Failed to fetch account nonce")?;
        let nonce = rpc::parse_quantity(&nonce)?;

        let gas_price: String = self
            .rpc
            .call_with_retry("eth_gasPrice", vec![])
            .await
            .context("Failed to fetch gas price")?;
        let gas_price = rpc::parse_quantity_u128(&gas_price)?;

        let tx = if self.settings.legacy {
            CreationTx::Legacy(TxLegacy {
                chain_id: Some(self.chain_id),
                nonce,
                gas_price,
                gas_limit,
                to: TxKind::Create,
                value: U256::ZERO,
                input: data,
            })
        } else {
            let priority_fee = match self
                .rpc
                .call::<String>("eth_maxPriorityFeePerGas", vec![])
                .await
                .and_then(|fee| rpc::parse_quantity_u128(&fee))
            {
                Ok(fee) => fee,
                Err(err) => {
                    tracing::debug!(error = %err, "Priority fee unavailable, using fallback");
                    FALLBACK_PRIORITY_FEE
                }
            };

            CreationTx::Eip1559(TxEip1559 {
                chain_id: self.chain_id,
                nonce,
                gas_limit,
                max_fee_per_gas: gas_price.saturating_mul(2).saturating_add(priority_fee),
                max_priority_fee_per_gas: priority_fee,
                to: TxKind::Create,
                value: U256::ZERO,
                input: data,
                ..Default::default()
            })
        };

        let signed = sign_creation(signer, tx)?;
        let returned: B256 = self
            .rpc
            .call("eth_sendRawTransaction", vec![json!(signed.raw)])
            .await
            .context("Failed to send deployment transaction")?;

        if returned != signed.hash {
            tracing::warn!(expected = %signed.hash, returned = %returned, "Node returned an unexpected transaction hash");
        }

        Ok(signed.hash)
    }

    /// Wait until `tx_hash` is mined with the configured number of confirmations.
    async fn wait_for_confirmation(&self, tx_hash: B256) -> Result<Receipt, PollError> {
        let confirmations = self.settings.confirmations.max(1);

        rpc::poll_until(
            "deployment confirmation",
            self.settings.timeout(),
            self.settings.poll_interval(),
            &self.cancel,
            || async move {
                let receipt: Option<Receipt> = self
                    .rpc
                    .call_with_retry("eth_getTransactionReceipt", vec![json!(tx_hash)])
                    .await
                    .context("Failed to fetch transaction receipt")?;

                let Some(receipt) = receipt else {
                    return Ok(None);
                };

                if !receipt.succeeded() {
                    anyhow::bail!(
                        "transaction {} reverted in block {}",
                        tx_hash,
                        receipt.block_number
                    );
                }

                if confirmations > 1 {
                    let head = self.rpc.block_number().await?;
                    if head.saturating_sub(receipt.block_number) + 1 < confirmations {
                        tracing::debug!(
                            %tx_hash,
                            block = receipt.block_number,
                            head,
                            confirmations,
                            "Waiting for more confirmations..."
                        );
                        return Ok(None);
                    }
                }

                Ok(Some(receipt))
            },
        )
        .await
    }
}

impl ContractDeployer for ChainDeployer {
    async fn deploy(&self, request: &DeploymentRequest) -> Result<DeployedContract, DeployError> {
        let contract = request.name.as_str();
        let data = self.creation_code(request)?;

        tracing::debug!(contract, size = data.len(), "Submitting creation transaction");

        let tx_hash = self
            .submit(data)
            .await
            .map_err(|e| DeployError::deployment(contract, e))?;

        tracing::info!(contract, %tx_hash, "Waiting for deployment to be confirmed...");

        let receipt = self
            .wait_for_confirmation(tx_hash)
            .await
            .map_err(|e| match e {
                PollError::Timeout(after) => DeployError::Timeout {
                    contract: contract.to_string(),
                    after,
                },
                PollError::Cancelled => DeployError::Cancelled {
                    contract: contract.to_string(),
                },
                PollError::Failed(err) => DeployError::deployment(contract, err),
            })?;

        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::deployment(
                contract,
                anyhow::anyhow!("receipt of {} has no contract address", tx_hash),
            )
        })?;

        Ok(DeployedContract {
            name: request.name.clone(),
            address,
            transaction_hash: tx_hash,
            block_number: receipt.block_number,
        })
    }
}
