//! Static registry of the contracts this tool knows how to deploy.

use crate::{
    ConstructorArg, ContractArtifact, DeployError, DeploymentPlan, DeploymentTarget,
};

/// Contracts with a known constructor signature and default arguments.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::IntoStaticStr,
)]
pub enum ContractKind {
    /// Access control registry; its owner is the deployer.
    AuthorizationManager,
    /// Vault guarded by an `AuthorizationManager`.
    SecureVault,
}

impl ContractKind {
    /// Solidity types of the constructor parameters.
    pub const fn constructor_inputs(&self) -> &'static [&'static str] {
        match self {
            ContractKind::AuthorizationManager => &["address"],
            ContractKind::SecureVault => &["address"],
        }
    }

    /// The target deploying this contract with its default arguments.
    pub fn default_target(&self) -> DeploymentTarget {
        let args = match self {
            ContractKind::AuthorizationManager => vec![ConstructorArg::Deployer],
            ContractKind::SecureVault => vec![ConstructorArg::address_of(
                ContractKind::AuthorizationManager.to_string(),
            )],
        };
        DeploymentTarget::new(self.to_string(), args)
    }

    /// Check that an artifact exposes the expected constructor.
    pub fn check_artifact(&self, artifact: &ContractArtifact) -> Result<(), DeployError> {
        let found = artifact.constructor_types();
        let expected = self.constructor_inputs();
        if found.as_slice() != expected {
            return Err(DeployError::Compilation(format!(
                "artifact of {} declares constructor({}), expected constructor({})",
                self,
                found.join(","),
                expected.join(",")
            )));
        }
        Ok(())
    }
}

/// `AuthorizationManager($deployer)` followed by `SecureVault(@AuthorizationManager)`.
pub fn default_plan() -> Result<DeploymentPlan, DeployError> {
    DeploymentPlan::new(vec![
        ContractKind::AuthorizationManager.default_target(),
        ContractKind::SecureVault.default_target(),
    ])
}
