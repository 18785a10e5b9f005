//! list_files: enumerate project files.

use async_trait::async_trait;
use gemcode_core::error::ToolError;
use gemcode_core::tool::{ParameterSpec, Tool};
use gemcode_core::turn::ToolArgs;
use gemcode_core::work_tree::WorkTree;

pub struct ListFilesTool;

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List all files in the project, one full path per line. Ignored files (.gitignore, build output) are skipped."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![]
    }

    async fn execute(&self, tree: &WorkTree, _args: &ToolArgs) -> Result<String, ToolError> {
        let walker = tree.clone();
        let files = tokio::task::spawn_blocking(move || walker.files())
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        if files.is_empty() {
            return Ok("No files found in the project".into());
        }

        Ok(files
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("\n"))
    }
}
