//! Error taxonomy for a deployment run.

use std::time::Duration;

/// Every way a deployment run can fail.
///
/// RPC and filesystem plumbing reports `anyhow` errors; they are folded into the
/// variant of the pipeline stage they happened in.
#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    /// The network endpoint or the signing identity could not be resolved.
    #[error("environment error: {0}")]
    Environment(String),

    /// A contract artifact is missing, malformed or does not match its expected interface.
    #[error("compilation error: {0}")]
    Compilation(String),

    /// The deployment plan breaks an ordering invariant.
    #[error("invalid deployment plan: {0}")]
    Plan(String),

    /// Constructor arguments do not fit the contract's constructor.
    #[error("invalid constructor arguments for {contract}: {reason}")]
    Arguments { contract: String, reason: String },

    /// The creation transaction could not be submitted, or it reverted.
    #[error("deployment of {contract} failed: {reason}")]
    Deployment { contract: String, reason: String },

    /// The creation transaction was not confirmed in time.
    #[error("timed out after {}s waiting for {contract} to be confirmed", after.as_secs())]
    Timeout { contract: String, after: Duration },

    /// The run was cancelled while deploying a contract.
    #[error("cancelled while deploying {contract}")]
    Cancelled { contract: String },

    /// The deployment report could not be written.
    #[error("failed to write deployment report: {0}")]
    Report(String),
}

impl DeployError {
    pub(crate) fn environment(err: impl Into<anyhow::Error>) -> Self {
        Self::Environment(format!("{:#}", err.into()))
    }

    pub(crate) fn compilation(err: impl Into<anyhow::Error>) -> Self {
        Self::Compilation(format!("{:#}", err.into()))
    }

    pub(crate) fn deployment(contract: &str, err: impl Into<anyhow::Error>) -> Self {
        Self::Deployment {
            contract: contract.to_string(),
            reason: format!("{:#}", err.into()),
        }
    }

    pub(crate) fn arguments(contract: &str, reason: impl Into<String>) -> Self {
        Self::Arguments {
            contract: contract.to_string(),
            reason: reason.into(),
        }
    }
}
