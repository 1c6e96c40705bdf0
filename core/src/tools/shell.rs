use crate::tools::extract_string_arg;
use crate::traits::{Tool, ToolResult};
use async_trait::async_trait;
use serde_json::json;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Substrings that refuse a command outright, matched case-insensitively
/// anywhere in the command text.
const DENIED_SUBSTRINGS: &[&str] = &["rm", "del", "format", "sudo", "su", "chmod", "chown"];

pub struct ShellTool {
    workspace: std::path::PathBuf,
    timeout: Duration,
}

impl ShellTool {
    pub fn new(workspace: impl AsRef<std::path::Path>) -> Self {
        Self {
            workspace: workspace.as_ref().to_path_buf(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub fn is_denied(command: &str) -> bool {
    let lowered = command.to_lowercase();
    DENIED_SUBSTRINGS.iter().any(|d| lowered.contains(d))
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        "execute_shell_command"
    }

    fn description(&self) -> &str {
        "Execute a shell command (with safety restrictions)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "Shell command to execute"
                }
            },
            "required": ["command"]
        })
    }

    async fn execute(&self, args: serde_json::Value) -> anyhow::Result<ToolResult> {
        let command = extract_string_arg(&args, "command")?;

        if is_denied(&command) {
            tracing::warn!(command = %command, "Refused shell command");
            return Ok(ToolResult::error(
                "Command not allowed for security reasons",
            ));
        }

        if !self.workspace.exists()
            && let Err(e) = tokio::fs::create_dir_all(&self.workspace).await
        {
            return Ok(ToolResult::error(format!(
                "Error executing command: {}",
                e
            )));
        }

        tracing::debug!(command = %command, "Executing shell command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(&command)
            .current_dir(&self.workspace)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(self.timeout, child).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let stderr = String::from_utf8_lossy(&output.stderr);
                let exit_code = output.status.code().unwrap_or(-1);

                Ok(ToolResult::success(format!(
                    "Exit code: {}\nOutput: {}\nError: {}",
                    exit_code, stdout, stderr
                )))
            }
            Ok(Err(e)) => Ok(ToolResult::error(format!(
                "Error executing command: {}",
                e
            ))),
            Err(_) => Ok(ToolResult::error(format!(
                "Command timed out after {}s",
                self.timeout.as_secs_f64()
            ))),
        }
    }
}
