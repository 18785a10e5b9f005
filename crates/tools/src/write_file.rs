//! write_file: write content to a file, creating parent directories.

use async_trait::async_trait;
use gemcode_core::error::ToolError;
use gemcode_core::tool::{ParamKind, ParameterSpec, Tool};
use gemcode_core::turn::ToolArgs;
use gemcode_core::work_tree::WorkTree;
use tracing::debug;

pub struct WriteFileTool;

impl WriteFileTool {
    fn failed(&self, reason: String) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason,
        }
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file, replacing what is there. Missing parent directories are created."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("file_path", ParamKind::String, "Path of the file to write"),
            ParameterSpec::required("content", ParamKind::String, "The full new content of the file"),
        ]
    }

    async fn execute(&self, tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError> {
        let path = tree.resolve(crate::str_arg(self.name(), args, "file_path")?);
        let content = crate::str_arg(self.name(), args, "content")?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failed(format!("cannot create {}: {e}", parent.display())))?;
        }

        debug!(path = %path.display(), bytes = content.len(), "Writing file");

        tokio::fs::write(&path, content)
            .await
            .map_err(|e| self.failed(format!("cannot write {}: {e}", path.display())))?;

        Ok(format!("Successfully wrote {} bytes to {}", content.len(), path.display()))
    }
}
