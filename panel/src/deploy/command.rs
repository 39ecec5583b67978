//! Run-to-completion external commands

use std::process::Stdio;

use tokio::process::Command;
use tracing::debug;

use crate::errors::DockyardError;

/// Run `command` to completion and return its stdout.
///
/// A spawn failure or non-zero exit becomes an `ExternalTool` error carrying
/// the exit code and the command's stderr.
pub async fn run_to_completion(mut command: Command, tool: &str) -> Result<String, DockyardError> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|e| DockyardError::external_tool(tool, format!("failed to spawn: {}", e)))?;

    if !output.status.success() {
        let code = output
            .status
            .code()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "signal".to_string());
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DockyardError::external_tool(
            tool,
            format!("exit code {}: {}", code, stderr.trim()),
        ));
    }

    debug!(tool = tool, "Command completed");
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
