use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::OpinionError;

/// How a CLI validator is invoked.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Executable to run. `claude` in production.
    pub program: String,
    pub model: String,
    /// Hard limit for one invocation; the child is killed when it expires.
    pub timeout: Duration,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            model: "claude-3-5-haiku-latest".to_string(),
            timeout: Duration::from_secs(10),
        }
    }
}

/// Run the validator CLI once in print mode and return its stdout.
pub async fn invoke_cli(
    system_prompt: &str,
    user_prompt: &str,
    config: &CliConfig,
) -> Result<String, OpinionError> {
    debug!(program = %config.program, model = %config.model, "Invoking validator CLI");

    let child = Command::new(&config.program)
        .args([
            "-p",
            user_prompt,
            "--system-prompt",
            system_prompt,
            "--model",
            &config.model,
            "--output-format",
            "text",
        ])
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(config.timeout, child)
        .await
        .map_err(|_| OpinionError::Timeout(config.timeout.as_millis() as u64))?
        .map_err(|e| OpinionError::Cli(format!("failed to spawn {}: {e}", config.program)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        warn!(status = %output.status, stderr = %stderr, "Validator CLI failed");
        return Err(OpinionError::Cli(format!(
            "{} exited {}: {}",
            config.program,
            output.status,
            stderr.trim()
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if stdout.trim().is_empty() {
        return Err(OpinionError::Cli("validator returned empty output".to_string()));
    }
    Ok(stdout)
}

/// Whether `program --version` runs successfully.
pub async fn check_cli_available(program: &str) -> bool {
    match Command::new(program).arg("--version").output().await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}
