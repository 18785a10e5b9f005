//! Built-in tool implementations for gemcode.
//!
//! Tools give the agent the ability to work on the project:
//! read, write and create files, list and search the tree, and run
//! shell commands. None of them are sandboxed; paths resolve against
//! the work tree but absolute paths are honoured as given.

pub mod create_file;
pub mod expression_search;
pub mod list_files;
pub mod read_file;
pub mod shell;
pub mod write_file;

use gemcode_core::error::ToolError;
use gemcode_core::tool::ToolRegistry;
use gemcode_core::turn::ToolArgs;
use std::time::Duration;

/// Create a registry with all built-in tools, in the order the model sees them.
pub fn default_registry(shell_timeout: Duration) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(read_file::ReadFileTool));
    registry.register(Box::new(write_file::WriteFileTool));
    registry.register(Box::new(create_file::CreateFileTool));
    registry.register(Box::new(list_files::ListFilesTool));
    registry.register(Box::new(shell::RunCliTool::new(shell_timeout)));
    registry.register(Box::new(expression_search::ExpressionSearchTool));
    registry
}

/// Fetch a string argument. The registry has already checked presence and
/// type, but tools can also be called directly.
pub(crate) fn str_arg<'a>(tool: &str, args: &'a ToolArgs, key: &str) -> Result<&'a str, ToolError> {
    args.get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ToolError::BadArgs {
            tool: tool.to_string(),
            reason: format!("missing required argument '{key}'"),
        })
}
