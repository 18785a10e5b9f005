//! create_file: create a new empty file.

use async_trait::async_trait;
use gemcode_core::error::ToolError;
use gemcode_core::tool::{ParamKind, ParameterSpec, Tool};
use gemcode_core::turn::ToolArgs;
use gemcode_core::work_tree::WorkTree;
use std::io::ErrorKind;

pub struct CreateFileTool;

#[async_trait]
impl Tool for CreateFileTool {
    fn name(&self) -> &str {
        "create_file"
    }

    fn description(&self) -> &str {
        "Create a new, empty file. Fails if the file already exists."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![ParameterSpec::required("path", ParamKind::String, "Path of the file to create")]
    }

    async fn execute(&self, tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError> {
        let path = tree.resolve(crate::str_arg(self.name(), args, "path")?);

        let result = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await;

        match result {
            Ok(_) => Ok(format!("Created file {}", path.display())),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("file already exists: {}", path.display()),
            }),
            Err(e) => Err(ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("cannot create {}: {e}", path.display()),
            }),
        }
    }
}
