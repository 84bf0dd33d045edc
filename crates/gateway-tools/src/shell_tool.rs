//! `shell`/`bash` built-ins (§4.3): policy-gated one-shot command execution.
//! `bash` is a plain alias of `shell` — both tools run through the same
//! `validate_bash_input` pipeline (§4.2) before a process is ever spawned.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use gateway_core::config::AutonomyConfig;
use gateway_policy::{validate_bash_input, BashInput};

use crate::tool_trait::{Tool, ToolResult};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub struct ShellTool {
    name: &'static str,
    autonomy: AutonomyConfig,
    extra_allowed: Vec<String>,
}

impl ShellTool {
    pub fn shell(autonomy: AutonomyConfig, extra_allowed: Vec<String>) -> Self {
        Self { name: "shell", autonomy, extra_allowed }
    }

    pub fn bash(autonomy: AutonomyConfig, extra_allowed: Vec<String>) -> Self {
        Self { name: "bash", autonomy, extra_allowed }
    }
}

#[async_trait]
impl Tool for ShellTool {
    fn name(&self) -> &str {
        self.name
    }

    fn description(&self) -> &str {
        "Run a shell command, subject to the allow-list and autonomy policy."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The shell command to run"},
                "approved": {"type": "boolean", "description": "Whether a medium-risk command has been pre-approved"},
                "timeout_secs": {"type": "integer", "description": "Override the default 30s execution timeout"},
            },
            "required": ["command"],
        })
    }

    async fn execute(&self, raw: Value) -> ToolResult {
        let timeout_secs = raw.get("timeout_secs").and_then(Value::as_u64).unwrap_or(DEFAULT_TIMEOUT_SECS);
        let input: BashInput = match serde_json::from_value(raw) {
            Ok(v) => v,
            Err(e) => return ToolResult::error(format!("invalid arguments: {e}")),
        };
        let command = input.command.clone();

        if let Err(e) = validate_bash_input(&input, &self.autonomy, &self.extra_allowed) {
            return ToolResult::error(e.to_string());
        }

        run_command(&command, timeout_secs).await
    }
}

async fn run_command(command: &str, timeout_secs: u64) -> ToolResult {
    let mut child = match Command::new("sh").arg("-c").arg(command).stdout(Stdio::piped()).stderr(Stdio::piped()).spawn() {
        Ok(c) => c,
        Err(e) => return ToolResult::error(format!("failed to spawn command: {e}")),
    };

    let output = match tokio::time::timeout(Duration::from_secs(timeout_secs), child.wait_with_output()).await {
        Ok(Ok(output)) => output,
        Ok(Err(e)) => return ToolResult::error(format!("command execution failed: {e}")),
        Err(_) => return ToolResult::error(format!("command timed out after {timeout_secs}s")),
    };

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    let mut combined = String::new();
    if !stdout.is_empty() {
        combined.push_str(&stdout);
    }
    if !stderr.is_empty() {
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    if output.status.success() {
        ToolResult::success(combined)
    } else {
        let code = output.status.code().map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string());
        ToolResult::error(format!("exit code {code}\n{combined}"))
    }
}

#[cfg(test)]
mod tests {
    use gateway_core::config::AutonomyLevel;

    use super::*;

    fn autonomy(level: AutonomyLevel) -> AutonomyConfig {
        AutonomyConfig { level, block_high_risk: true, workspace_only: false }
    }

    #[tokio::test]
    async fn echo_command_succeeds() {
        let tool = ShellTool::shell(autonomy(AutonomyLevel::Supervised), vec![]);
        let result = tool.execute(serde_json::json!({"command": "echo hello"})).await;
        assert!(!result.is_error);
        assert_eq!(result.content.trim(), "hello");
    }

    #[tokio::test]
    async fn bash_alias_shares_the_same_policy_pipeline() {
        let tool = ShellTool::bash(autonomy(AutonomyLevel::Readonly), vec![]);
        let result = tool.execute(serde_json::json!({"command": "echo hi"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn disallowed_command_is_rejected_before_spawning() {
        let tool = ShellTool::shell(autonomy(AutonomyLevel::Supervised), vec![]);
        let result = tool.execute(serde_json::json!({"command": "sudo rm -rf /"})).await;
        assert!(result.is_error);
    }

    #[tokio::test]
    async fn nonzero_exit_status_is_reported_as_error() {
        let tool = ShellTool::shell(autonomy(AutonomyLevel::Supervised), vec![]);
        let result = tool.execute(serde_json::json!({"command": "ls /no-such-path-xyz"})).await;
        assert!(result.is_error);
        assert!(result.content.contains("exit code"));
    }
}
