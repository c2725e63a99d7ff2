//! Compiled contract artifacts (ABI + creation bytecode).
//!
//! Hardhat (`artifacts/contracts/Source.sol/Name.json`) and Foundry
//! (`out/Source.sol/Name.json`) layouts are both understood, as well as a flat
//! `Name.json` at the root of the artifacts directory.

use std::path::{Path, PathBuf};

use alloy_core::dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_core::json_abi::JsonAbi;
use alloy_core::primitives::Bytes;
use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{ConstructorValue, DeployError};

/// Artifact JSON as written by Hardhat or Foundry.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawArtifact {
    #[serde(default)]
    contract_name: Option<String>,
    abi: JsonAbi,
    bytecode: RawBytecode,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawBytecode {
    /// Hardhat: `"bytecode": "0x6080..."`.
    Hex(String),
    /// Foundry: `"bytecode": { "object": "0x6080...", ... }`.
    Object { object: String },
}

impl RawBytecode {
    fn as_hex(&self) -> &str {
        match self {
            Self::Hex(hex) | Self::Object { object: hex } => hex,
        }
    }
}

/// A loaded, deployable contract artifact.
#[derive(Debug, Clone)]
pub struct ContractArtifact {
    pub name: String,
    pub path: PathBuf,
    pub abi: JsonAbi,
    pub bytecode: Bytes,
}

impl ContractArtifact {
    /// Parse an artifact file.
    pub fn from_file(name: &str, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read artifact {}", path.display()))?;
        let raw: RawArtifact = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse artifact {}", path.display()))?;

        if let Some(contract_name) = &raw.contract_name {
            if contract_name != name {
                anyhow::bail!(
                    "Artifact {} describes '{}', expected '{}'",
                    path.display(),
                    contract_name,
                    name
                );
            }
        }

        let hex_code = raw.bytecode.as_hex().trim_start_matches("0x");
        if hex_code.contains("__") {
            anyhow::bail!(
                "Bytecode of '{}' has unlinked library placeholders",
                name
            );
        }
        let bytecode = hex::decode(hex_code)
            .with_context(|| format!("Bytecode of '{}' is not valid hex", name))?;
        if bytecode.is_empty() {
            anyhow::bail!(
                "'{}' has no creation bytecode (abstract contract or interface?)",
                name
            );
        }

        Ok(Self {
            name: name.to_string(),
            path: path.to_path_buf(),
            abi: raw.abi,
            bytecode: bytecode.into(),
        })
    }

    /// Solidity types of the constructor parameters, in order.
    pub fn constructor_types(&self) -> Vec<&str> {
        self.abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.iter().map(|p| p.ty.as_str()).collect())
            .unwrap_or_default()
    }

    /// Coerce resolved arguments to the constructor's parameter types.
    pub fn encode_args(&self, args: &[ConstructorValue]) -> Result<Vec<DynSolValue>, DeployError> {
        let inputs = self
            .abi
            .constructor
            .as_ref()
            .map(|constructor| constructor.inputs.as_slice())
            .unwrap_or_default();

        if inputs.len() != args.len() {
            return Err(DeployError::arguments(
                &self.name,
                format!(
                    "constructor takes {} argument(s), got {}",
                    inputs.len(),
                    args.len()
                ),
            ));
        }

        inputs
            .iter()
            .zip(args)
            .map(|(param, arg)| {
                let ty: DynSolType = param.resolve().map_err(|e| {
                    DeployError::arguments(
                        &self.name,
                        format!("unsupported parameter type '{}': {}", param.ty, e),
                    )
                })?;

                match arg {
                    ConstructorValue::Address(address) if ty == DynSolType::Address => {
                        Ok(DynSolValue::Address(*address))
                    }
                    ConstructorValue::Address(address) => Err(DeployError::arguments(
                        &self.name,
                        format!(
                            "parameter '{}' is of type {}, cannot pass address {}",
                            param.name, param.ty, address
                        ),
                    )),
                    ConstructorValue::Literal(value) => ty.coerce_str(value).map_err(|e| {
                        DeployError::arguments(
                            &self.name,
                            format!(
                                "'{}' is not a valid {} for parameter '{}': {}",
                                value, param.ty, param.name, e
                            ),
                        )
                    }),
                }
            })
            .collect()
    }

    /// Creation calldata: bytecode followed by the ABI-encoded constructor arguments.
    pub fn creation_code(&self, args: &[DynSolValue]) -> Bytes {
        let mut code = self.bytecode.to_vec();
        if !args.is_empty() {
            code.extend(DynSolValue::Tuple(args.to_vec()).abi_encode_params());
        }
        code.into()
    }
}

/// Looks artifacts up by contract name under a root directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Find and parse the artifact of `name`.
    pub fn load(&self, name: &str) -> Result<ContractArtifact, DeployError> {
        let path = self.find(name).map_err(DeployError::compilation)?;
        tracing::debug!(contract = name, path = %path.display(), "Loading artifact");
        ContractArtifact::from_file(name, &path).map_err(DeployError::compilation)
    }

    fn find(&self, name: &str) -> Result<PathBuf> {
        if !self.root.is_dir() {
            anyhow::bail!(
                "Artifacts directory not found: {} (did the contracts compile?)",
                self.root.display()
            );
        }

        let flat = self.root.join(format!("{}.json", name));
        if flat.is_file() {
            return Ok(flat);
        }

        let file_name = format!("{}.json", name);
        let mut candidates = Vec::new();
        let mut pending = vec![self.root.clone()];

        // Any `<source>.sol/<Name>.json`: a source file may define several contracts.
        while let Some(dir) = pending.pop() {
            let entries = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to read directory {}", dir.display()))?;

            for entry in entries {
                let path = entry
                    .with_context(|| format!("Failed to read directory {}", dir.display()))?
                    .path();
                if path.is_dir() {
                    // Hardhat keeps build metadata next to the artifacts.
                    if !path.file_name().is_some_and(|n| n == "build-info") {
                        pending.push(path);
                    }
                    continue;
                }
                if dir != self.root
                    && path.file_name().is_some_and(|n| n == file_name.as_str())
                    && describes(&path, name)
                {
                    candidates.push(path);
                }
            }
        }

        candidates.sort();
        match candidates.len() {
            0 => anyhow::bail!(
                "No artifact for contract '{}' under {}",
                name,
                self.root.display()
            ),
            1 => Ok(candidates.remove(0)),
            _ => anyhow::bail!(
                "Contract name '{}' is ambiguous, found artifacts: {}",
                name,
                candidates
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

/// Whether the artifact at `path` is for `name`.
///
/// Foundry artifacts carry no `contractName`, and unreadable files are kept so
/// that loading them reports the actual problem.
fn describes(path: &Path, name: &str) -> bool {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Named {
        contract_name: Option<String>,
    }

    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str::<Named>(&content).ok())
        .and_then(|named| named.contract_name)
        .is_none_or(|contract_name| contract_name == name)
}
