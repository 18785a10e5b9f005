//! Tool trait: the abstraction over agent capabilities.
//!
//! Tools are what give the agent the ability to act on the project:
//! read and write files, list the tree, search it, run commands.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use crate::error::ToolError;
use crate::turn::ToolArgs;
use crate::work_tree::WorkTree;

/// Primitive type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    /// The JSON-schema type name.
    pub fn json_type(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }

    /// Parse a JSON-schema type name. Unknown names fall back to `None`.
    pub fn from_json_type(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "string" => Some(ParamKind::String),
            "integer" => Some(ParamKind::Integer),
            "number" => Some(ParamKind::Number),
            "boolean" => Some(ParamKind::Boolean),
            "array" => Some(ParamKind::Array),
            "object" => Some(ParamKind::Object),
            _ => None,
        }
    }

    /// Whether `value` is acceptable for this kind.
    ///
    /// Models routinely send whole numbers as floats, so `2.0` is an integer.
    pub fn accepts(&self, value: &serde_json::Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Integer => {
                value.is_i64() || value.is_u64() || value.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Array => value.is_array(),
            ParamKind::Object => value.is_object(),
        }
    }
}

/// One named parameter of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ParameterSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: false,
        }
    }
}

/// A tool declaration sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDeclaration {
    /// Unique tool name
    pub name: String,

    /// Read by the model to decide when to invoke the tool
    pub description: String,

    /// Named parameters
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDeclaration {
    /// Render the parameters as a JSON-schema object.
    pub fn json_schema(&self) -> serde_json::Value {
        let mut properties = serde_json::Map::new();
        for p in &self.parameters {
            let mut prop = serde_json::json!({
                "type": p.kind.json_type(),
                "description": p.description,
            });
            if p.kind == ParamKind::Array {
                prop["items"] = serde_json::json!({ "type": "string" });
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Build a declaration from a JSON-schema object (e.g. an MCP tool's
    /// `inputSchema`). Properties with an unrecognised type become strings.
    pub fn from_json_schema(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: &serde_json::Value,
    ) -> Self {
        let required: Vec<&str> = schema["required"]
            .as_array()
            .map(|r| r.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let parameters = schema["properties"]
            .as_object()
            .map(|props| {
                props
                    .iter()
                    .map(|(key, prop)| ParameterSpec {
                        name: key.clone(),
                        kind: prop["type"]
                            .as_str()
                            .and_then(ParamKind::from_json_type)
                            .unwrap_or(ParamKind::String),
                        description: prop["description"].as_str().unwrap_or_default().to_string(),
                        required: required.contains(&key.as_str()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Check `args` against the declared parameters.
    pub fn validate(&self, args: &ToolArgs) -> Result<(), ToolError> {
        for p in &self.parameters {
            match args.get(&p.name) {
                None | Some(serde_json::Value::Null) if p.required => {
                    return Err(ToolError::BadArgs {
                        tool: self.name.clone(),
                        reason: format!("missing required argument '{}'", p.name),
                    });
                }
                Some(value) if !value.is_null() && !p.kind.accepts(value) => {
                    return Err(ToolError::BadArgs {
                        tool: self.name.clone(),
                        reason: format!("argument '{}' must be of type {}", p.name, p.kind.json_type()),
                    });
                }
                _ => {}
            }
        }
        Ok(())
    }
}

/// The core Tool trait.
///
/// Each built-in tool implements this trait. Tools are registered in the
/// ToolRegistry and made available to the agent loop.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "read_file").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// The tool's parameters.
    fn parameters(&self) -> Vec<ParameterSpec>;

    /// Execute the tool. `args` have already been validated against
    /// `parameters()` when called through the registry.
    async fn execute(&self, tree: &WorkTree, args: &ToolArgs) -> Result<String, ToolError>;

    /// Convert this tool into a ToolDeclaration for sending to the model.
    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// An ordered registry of available tools.
///
/// The agent loop uses this to:
/// 1. Get tool declarations to send to the model
/// 2. Validate and dispatch tool calls the model requests
pub struct ToolRegistry {
    tools: Vec<Box<dyn Tool>>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name in place.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        match self.index.get(&name) {
            Some(&slot) => self.tools[slot] = tool,
            None => {
                self.index.insert(name, self.tools.len());
                self.tools.push(tool);
            }
        }
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.index.get(name).map(|&slot| self.tools[slot].as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declarations in registration order.
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|t| t.declaration()).collect()
    }

    /// Validate the arguments and run the named tool.
    pub async fn dispatch(
        &self,
        tree: &WorkTree,
        name: &str,
        args: &ToolArgs,
    ) -> Result<String, ToolError> {
        let tool = self.get(name).ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        tool.declaration().validate(args)?;
        tool.execute(tree, args).await
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
