//! expression_search: find files containing a literal or a regex.

use async_trait::async_trait;
use gemcode_core::error::ToolError;
use gemcode_core::tool::{ParamKind, ParameterSpec, Tool};
use gemcode_core::turn::ToolArgs;
use gemcode_core::work_tree::WorkTree;
use regex::Regex;
use tracing::debug;

pub struct ExpressionSearchTool;

#[async_trait]
impl Tool for ExpressionSearchTool {
    fn name(&self) -> &str {
        "expression_search"
    }

    fn description(&self) -> &str {
        "Search project files for an expression and list the files that contain it. \
         The expression is matched literally unless is_regex is true."
    }

    fn parameters(&self) -> Vec<ParameterSpec> {
        vec![
            ParameterSpec::required("expression", ParamKind::String, "Text or pattern to look for"),
            ParameterSpec::optional(
                "is_regex",
                ParamKind::Boolean,
                "Treat the expression as a regular expression (default false)",
            ),
        ]
    }

    async fn execute(&self, tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError> {
        let expression = crate::str_arg(self.name(), args, "expression")?;
        let is_regex = args.get("is_regex").and_then(|v| v.as_bool()).unwrap_or(false);

        let pattern = if is_regex {
            expression.to_string()
        } else {
            regex::escape(expression)
        };
        let re = Regex::new(&pattern).map_err(|e| ToolError::BadArgs {
            tool: self.name().into(),
            reason: format!("invalid regular expression: {e}"),
        })?;

        debug!(expression = %expression, is_regex, "Searching project");

        let walker = tree.clone();
        let matches = tokio::task::spawn_blocking(move || {
            walker
                .files()
                .into_iter()
                // Binary and unreadable files are skipped.
                .filter(|path| {
                    std::fs::read_to_string(path).is_ok_and(|content| re.is_match(&content))
                })
                .map(|path| path.display().to_string())
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: e.to_string(),
        })?;

        if matches.is_empty() {
            return Ok("No files found matching the expression.".into());
        }
        Ok(matches.join("\n"))
    }
}
