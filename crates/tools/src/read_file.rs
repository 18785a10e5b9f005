//! read_file: return a file's contents.

use async_trait::async_trait;
use gemcode_core::error::ToolError;
use gemcode_core::tool::{ParamKind, ParameterSpec, Tool};
use gemcode_core::turn::ToolArgs;
use gemcode_core::work_tree::WorkTree;
use tracing::debug;

pub struct ReadFileTool;

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file. Use the full path as shown in the project file list."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::required(
            "file_path",
            ParamKind::String,
            "Path of the file to read",
        )]
    }

    async fn execute(&self, tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError> {
        let path = tree.resolve(crate::str_arg(self.name(), args, "file_path")?);
        debug!(path = %path.display(), "Reading file");

        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("cannot read {}: {e}", path.display()),
            })
    }
}
