//! Deployment plans: ordered contracts whose constructor arguments may refer to
//! addresses produced earlier in the same run.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use alloy_core::primitives::{Address, B256};
use derive_more::Deref;
use serde::{Deserialize, Serialize};

use crate::DeployError;

/// A constructor argument as written in a plan.
///
/// In configuration files arguments are strings: `$deployer` is the signing
/// account, `@Name` the address of the earlier target `Name`, anything else a
/// literal coerced to the constructor parameter's type. Literals are taken
/// verbatim; a leading `\` escapes one that starts with `@`, `$` or `\`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ConstructorArg {
    /// The address of the signing account.
    Deployer,
    /// The address of a contract deployed earlier in the plan.
    AddressOf(String),
    /// A literal value, e.g. `42`, `true` or `0x5FbD…`.
    Literal(String),
}

impl ConstructorArg {
    const DEPLOYER: &'static str = "$deployer";
    const ESCAPE: char = '\\';

    pub fn address_of(name: impl Into<String>) -> Self {
        Self::AddressOf(name.into())
    }

    pub fn literal(value: impl Into<String>) -> Self {
        Self::Literal(value.into())
    }
}

impl FromStr for ConstructorArg {
    type Err = DeployError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(literal) = s.strip_prefix(Self::ESCAPE) {
            return Ok(Self::Literal(literal.to_string()));
        }

        let placeholder = s.trim();
        if placeholder == Self::DEPLOYER {
            return Ok(Self::Deployer);
        }
        if let Some(name) = placeholder.strip_prefix('@') {
            if name.is_empty() {
                return Err(DeployError::Plan(
                    "'@' must be followed by a contract name".to_string(),
                ));
            }
            return Ok(Self::AddressOf(name.to_string()));
        }
        if placeholder.starts_with('$') {
            return Err(DeployError::Plan(format!(
                "unknown placeholder '{}' (write '\\{}' for a literal)",
                placeholder, placeholder
            )));
        }
        Ok(Self::Literal(s.to_string()))
    }
}

impl TryFrom<String> for ConstructorArg {
    type Error = DeployError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ConstructorArg> for String {
    fn from(arg: ConstructorArg) -> Self {
        arg.to_string()
    }
}

impl fmt::Display for ConstructorArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deployer => f.write_str(Self::DEPLOYER),
            Self::AddressOf(name) => write!(f, "@{}", name),
            Self::Literal(value) => {
                if value.starts_with(Self::ESCAPE) || value.trim_start().starts_with(['@', '$']) {
                    write!(f, "{}", Self::ESCAPE)?;
                }
                f.write_str(value)
            }
        }
    }
}

/// A constructor argument with every placeholder substituted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConstructorValue {
    Address(Address),
    Literal(String),
}

impl fmt::Display for ConstructorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => write!(f, "{}", address),
            Self::Literal(value) => f.write_str(value),
        }
    }
}

/// One contract to deploy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentTarget {
    /// Contract name, as found in the artifacts.
    pub name: String,
    /// Constructor arguments, in declaration order.
    #[serde(default)]
    pub args: Vec<ConstructorArg>,
}

impl DeploymentTarget {
    pub fn new(name: impl Into<String>, args: Vec<ConstructorArg>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }
}

/// A request handed to a [`ContractDeployer`](crate::ContractDeployer).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentRequest {
    pub name: String,
    pub args: Vec<ConstructorValue>,
}

/// A contract confirmed on-chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployedContract {
    pub name: String,
    pub address: Address,
    pub transaction_hash: B256,
    pub block_number: u64,
}

/// An ordered, validated list of deployment targets.
///
/// Every `@Name` reference points to a target strictly earlier in the plan and
/// names are unique, so walking the plan front to back always has the
/// referenced addresses at hand.
#[derive(Debug, Clone, PartialEq, Eq, Deref)]
pub struct DeploymentPlan(Vec<DeploymentTarget>);

impl DeploymentPlan {
    /// Validate `targets` and build a plan from them.
    pub fn new(targets: Vec<DeploymentTarget>) -> Result<Self, DeployError> {
        if targets.is_empty() {
            return Err(DeployError::Plan("the plan is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for target in &targets {
            if target.name.trim().is_empty() {
                return Err(DeployError::Plan("a target has an empty name".to_string()));
            }

            for arg in &target.args {
                if let ConstructorArg::AddressOf(dependency) = arg {
                    if !seen.contains(dependency.as_str()) {
                        let reason = if dependency == &target.name {
                            "itself".to_string()
                        } else if targets.iter().any(|t| &t.name == dependency) {
                            format!("'{}', which is deployed later", dependency)
                        } else {
                            format!("'{}', which is not part of the plan", dependency)
                        };
                        return Err(DeployError::Plan(format!(
                            "'{}' depends on {}",
                            target.name, reason
                        )));
                    }
                }
            }

            if !seen.insert(target.name.as_str()) {
                return Err(DeployError::Plan(format!(
                    "'{}' appears more than once",
                    target.name
                )));
            }
        }

        Ok(Self(targets))
    }

    /// Substitute placeholders of `target` using the deployer address and the
    /// contracts deployed so far.
    pub fn resolve_args(
        target: &DeploymentTarget,
        deployer: Address,
        deployed: &[DeployedContract],
    ) -> Result<Vec<ConstructorValue>, DeployError> {
        target
            .args
            .iter()
            .map(|arg| match arg {
                ConstructorArg::Deployer => Ok(ConstructorValue::Address(deployer)),
                ConstructorArg::AddressOf(name) => deployed
                    .iter()
                    .find(|contract| &contract.name == name)
                    .map(|contract| ConstructorValue::Address(contract.address))
                    .ok_or_else(|| {
                        DeployError::Plan(format!(
                            "'{}' needs the address of '{}', which has not been deployed",
                            target.name, name
                        ))
                    }),
                ConstructorArg::Literal(value) => Ok(ConstructorValue::Literal(value.clone())),
            })
            .collect()
    }

    pub fn into_inner(self) -> Vec<DeploymentTarget> {
        self.0
    }
}
