//! Optional build step run before artifacts are read.

use anyhow::Context;
use tokio::process::Command;

use crate::DeployError;

/// Lines of compiler output kept in the error message on failure.
const ERROR_TAIL_LINES: usize = 20;

/// Run `command` (program followed by its arguments) and wait for it.
///
/// A non-zero exit status is a [`DeployError::Compilation`] carrying the tail of
/// the command's stderr.
pub async fn run(command: &[String]) -> Result<(), DeployError> {
    let Some((program, args)) = command.split_first() else {
        return Err(DeployError::Compilation(
            "compile command is empty".to_string(),
        ));
    };

    tracing::info!(command = %command.join(" "), "Compiling contracts...");

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .with_context(|| format!("Failed to run '{}'", program))
        .map_err(DeployError::compilation)?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        tracing::debug!(target: "vaultup::compile", "{}", line);
    }

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(ERROR_TAIL_LINES)..].join("\n");
        return Err(DeployError::Compilation(format!(
            "'{}' exited with {}\n{}",
            command.join(" "),
            output.status,
            tail
        )));
    }

    tracing::info!("Contracts compiled");
    Ok(())
}
