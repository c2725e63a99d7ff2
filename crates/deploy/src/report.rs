//! Summary of a completed deployment run.

use std::fmt;
use std::path::Path;

use alloy_core::primitives::Address;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use comfy_table::{Table, presets};
use serde::{Deserialize, Serialize};

use crate::DeployedContract;

/// Network identity and addresses produced by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    pub deployer: Address,
    /// Deployed contracts, in deployment order.
    pub contracts: Vec<DeployedContract>,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentReport {
    pub fn new(
        network: impl Into<String>,
        chain_id: u64,
        deployer: Address,
        contracts: Vec<DeployedContract>,
    ) -> Self {
        Self {
            network: network.into(),
            chain_id,
            deployer,
            contracts,
            finished_at: Utc::now(),
        }
    }

    /// Address of the contract deployed under `name`.
    pub fn address_of(&self, name: &str) -> Option<Address> {
        self.contracts
            .iter()
            .find(|contract| contract.name == name)
            .map(|contract| contract.address)
    }

    /// Write the report as pretty JSON, creating parent directories.
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json =
            serde_json::to_string_pretty(self).context("Failed to serialize deployment report")?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report to {}", path.display()))?;

        tracing::info!(path = %path.display(), "Deployment report saved");
        Ok(())
    }

    fn table(&self) -> Table {
        let mut table = Table::new();
        table
            .load_preset(presets::UTF8_FULL_CONDENSED)
            .set_header(vec!["Contract", "Address", "Transaction", "Block"]);

        for contract in &self.contracts {
            table.add_row(vec![
                contract.name.clone(),
                contract.address.to_string(),
                contract.transaction_hash.to_string(),
                contract.block_number.to_string(),
            ]);
        }

        table
    }
}

impl fmt::Display for DeploymentReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Deployment summary ===")?;
        writeln!(f, "Network:   {}", self.network)?;
        writeln!(f, "Chain ID:  {}", self.chain_id)?;
        writeln!(f, "Deployer:  {}", self.deployer)?;
        writeln!(f)?;
        write!(f, "{}", self.table())
    }
}
