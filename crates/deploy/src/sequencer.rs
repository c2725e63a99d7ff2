//! Strictly sequential walk over a deployment plan.

use alloy_core::primitives::Address;
use tokio_util::sync::CancellationToken;

use crate::{
    ContractDeployer, DeployError, DeployedContract, DeploymentPlan, DeploymentRequest,
};

/// Deploys the targets of a plan one after the other.
///
/// There is never more than one deployment in flight: later targets may need the
/// addresses of earlier ones. The walk stops at the first failure and nothing
/// already deployed is rolled back.
pub struct Sequencer<'a, D> {
    deployer: &'a D,
    cancel: CancellationToken,
}

impl<'a, D: ContractDeployer> Sequencer<'a, D> {
    pub fn new(deployer: &'a D, cancel: CancellationToken) -> Self {
        Self { deployer, cancel }
    }

    /// Deploy every target of `plan` in order, signing as `deployer_address`.
    pub async fn run(
        &self,
        plan: &DeploymentPlan,
        deployer_address: Address,
    ) -> Result<Vec<DeployedContract>, DeployError> {
        let mut deployed: Vec<DeployedContract> = Vec::with_capacity(plan.len());

        for (index, target) in plan.iter().enumerate() {
            if self.cancel.is_cancelled() {
                let err = DeployError::Cancelled {
                    contract: target.name.clone(),
                };
                Self::report_partial(&deployed, &err);
                return Err(err);
            }

            let args = DeploymentPlan::resolve_args(target, deployer_address, &deployed)?;

            tracing::info!(
                contract = %target.name,
                step = index + 1,
                total = plan.len(),
                args = %args.iter().map(ToString::to_string).collect::<Vec<_>>().join(", "),
                "Deploying contract..."
            );

            let request = DeploymentRequest {
                name: target.name.clone(),
                args,
            };

            match self.deployer.deploy(&request).await {
                Ok(contract) => {
                    tracing::info!(
                        tx_hash = %contract.transaction_hash,
                        block = contract.block_number,
                        "✓ {} deployed at: {}",
                        contract.name,
                        contract.address
                    );
                    deployed.push(contract);
                }
                Err(err) => {
                    Self::report_partial(&deployed, &err);
                    return Err(err);
                }
            }
        }

        Ok(deployed)
    }

    fn report_partial(deployed: &[DeployedContract], err: &DeployError) {
        if deployed.is_empty() {
            return;
        }
        tracing::warn!(error = %err, "Deployment halted, these contracts stay deployed:");
        for contract in deployed {
            tracing::warn!("  {}: {}", contract.name, contract.address);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use alloy_core::primitives::B256;

    use super::*;
    use crate::{ConstructorValue, registry::default_plan};

    /// Deployer returning sequential addresses and failing on a chosen call.
    #[derive(Default)]
    struct RecordingDeployer {
        calls: Mutex<Vec<DeploymentRequest>>,
        fail_at: Option<usize>,
    }

    impl ContractDeployer for RecordingDeployer {
        async fn deploy(
            &self,
            request: &DeploymentRequest,
        ) -> Result<DeployedContract, DeployError> {
            let n = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(request.clone());
                calls.len()
            };
            if self.fail_at == Some(n) {
                return Err(DeployError::Deployment {
                    contract: request.name.clone(),
                    reason: "execution reverted".to_string(),
                });
            }
            Ok(DeployedContract {
                name: request.name.clone(),
                address: Address::with_last_byte(n as u8),
                transaction_hash: B256::with_last_byte(n as u8),
                block_number: n as u64,
            })
        }
    }

    #[tokio::test]
    async fn test_substitutes_earlier_addresses() {
        let deployer = RecordingDeployer::default();
        let owner = Address::repeat_byte(0xaa);

        let deployed = Sequencer::new(&deployer, CancellationToken::new())
            .run(&default_plan().unwrap(), owner)
            .await
            .unwrap();

        let calls = deployer.calls.lock().unwrap();
        assert_eq!(calls[0].args, vec![ConstructorValue::Address(owner)]);
        assert_eq!(
            calls[1].args,
            vec![ConstructorValue::Address(deployed[0].address)]
        );
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let deployer = RecordingDeployer::default();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = Sequencer::new(&deployer, cancel)
            .run(&default_plan().unwrap(), Address::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Cancelled { ref contract } if contract == "AuthorizationManager"));
        assert!(deployer.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_halts_on_first_failure() {
        let deployer = RecordingDeployer {
            fail_at: Some(1),
            ..Default::default()
        };

        let err = Sequencer::new(&deployer, CancellationToken::new())
            .run(&default_plan().unwrap(), Address::ZERO)
            .await
            .unwrap_err();

        assert!(matches!(err, DeployError::Deployment { .. }));
        assert_eq!(deployer.calls.lock().unwrap().len(), 1);
    }
}
