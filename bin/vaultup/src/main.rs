//! vaultup deploys the AuthorizationManager and SecureVault contracts, in dependency order.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;

use cli::Cli;
use vaultup_deploy::{DeployConfig, Orchestrator};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let result = run(cli).await;
    ExitCode::from(exit_status(&result))
}

/// Process exit status of a run: 0 on success, 1 on any failure.
fn exit_status(result: &Result<()>) -> u8 {
    match result {
        Ok(()) => 0,
        Err(err) => {
            tracing::error!("✗ Deployment failed: {:#}", err);
            1
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = DeployConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);

    // Stop waiting for confirmations on Ctrl+C.
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling deployment...");
            on_interrupt.cancel();
        }
    });

    let report = Orchestrator::new(config)
        .with_cancellation(cancel)
        .run()
        .await?;

    println!();
    println!("{report}");

    Ok(())
}
