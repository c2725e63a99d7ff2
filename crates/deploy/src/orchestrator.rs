//! End-to-end deployment run: network resolution, compilation, sequencing, reporting.

use tokio_util::sync::CancellationToken;

use crate::{
    ArtifactStore, ChainDeployer, ContractDeployer, DeployConfig, DeployError, DeploymentPlan,
    DeploymentReport, NetworkContext, Sequencer, compile, registry, rpc::RpcClient,
};

/// Runs a whole deployment from a [`DeployConfig`].
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: DeployConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(config: DeployConfig) -> Self {
        Self {
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use `cancel` to abort the run, e.g. on Ctrl-C.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// The plan from the configuration, or the default plan when none is configured.
    pub fn plan(&self) -> Result<DeploymentPlan, DeployError> {
        if self.config.plan.is_empty() {
            registry::default_plan()
        } else {
            DeploymentPlan::new(self.config.plan.clone())
        }
    }

    pub async fn run(self) -> Result<DeploymentReport, DeployError> {
        // Validate the plan before touching the network.
        let plan = self.plan()?;

        let (network_name, network) = self.config.selected_network()?;
        let rpc = RpcClient::new(&network.url, self.config.deployment.rpc_timeout())
            .map_err(DeployError::environment)?;
        let context = NetworkContext::resolve(network_name, network, &rpc).await?;

        tracing::info!(
            account = %context.deployer(),
            network = %context.network_name,
            chain_id = context.chain_id,
            local_signer = context.signer.is_local(),
            "Deploying contracts..."
        );

        if let Some(command) = &self.config.compile {
            compile::run(command).await?;
        }

        let deployer = ChainDeployer::new(
            rpc,
            &context,
            ArtifactStore::new(&self.config.artifacts),
            self.config.deployment.clone(),
            self.cancel.clone(),
        );

        let report = execute(&context, &plan, &deployer, self.cancel.clone()).await?;

        if let Some(path) = &self.config.report {
            report
                .save_to_file(path)
                .map_err(|e| DeployError::Report(format!("{:#}", e)))?;
        }

        Ok(report)
    }
}

/// Deploy `plan` with `deployer` and build the report.
pub async fn execute<D: ContractDeployer>(
    context: &NetworkContext,
    plan: &DeploymentPlan,
    deployer: &D,
    cancel: CancellationToken,
) -> Result<DeploymentReport, DeployError> {
    let contracts = Sequencer::new(deployer, cancel)
        .run(plan, context.deployer())
        .await?;

    tracing::info!(count = contracts.len(), "✓ Deployment complete!");

    Ok(DeploymentReport::new(
        context.network_name.clone(),
        context.chain_id,
        context.deployer(),
        contracts,
    ))
}
