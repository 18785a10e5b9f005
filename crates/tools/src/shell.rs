//! run_cli: execute a shell command in the project root.
//!
//! No allowlist: the declaration tells the model to ask the user before
//! running anything, and a timeout stops runaway commands.

use async_trait::async_trait;
use gemcode_core::error::ToolError;
use gemcode_core::tool::{ParamKind, ParameterSpec, Tool};
use gemcode_core::turn::ToolArgs;
use gemcode_core::work_tree::WorkTree;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

pub struct RunCliTool {
    timeout: Duration,
}

impl RunCliTool {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl Tool for RunCliTool {
    fn name(&self) -> &str {
        "run_cli"
    }

    fn description(&self) -> &str {
        "Run a shell command in the project root and return its output. \
         IMPORTANT: Always ask the user for permission before running a CLI command, \
         and only run it after they have agreed."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::required(
            "command",
            ParamKind::String,
            "The shell command to execute",
        )]
    }

    async fn execute(&self, tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError> {
        let command = crate::str_arg(self.name(), args, "command")?;

        debug!(command = %command, cwd = %tree.root().display(), "Executing shell command");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        };
        cmd.current_dir(tree.root()).kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!(command = %command, timeout_secs = self.timeout.as_secs(), "Command timed out");
                return Err(ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);

        if output.status.success() {
            return Ok(if stderr.is_empty() {
                stdout.into_owned()
            } else {
                format!("{stdout}\nStderr: {stderr}")
            });
        }

        let code = output.status.code().unwrap_or(-1);
        warn!(command = %command, exit_code = code, "Command failed");
        Ok(format!(
            "Error: Command failed with return code {code}\nStdout: {stdout}\nStderr: {stderr}"
        ))
    }
}
