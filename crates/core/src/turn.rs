//! Turn domain types.
//!
//! A turn is one atomic entry in the conversation history. The ordered
//! sequence of turns IS the model's context, so these types are what flows
//! between the conversation store, the agent loop and the provider.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human, or a synthetic turn written on the human's behalf
    User,
    /// The language model
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// Arguments of a tool invocation: string keys to arbitrary JSON values.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// A tool call produced by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    /// Correlates the call with its result
    pub id: String,

    /// Name of the tool to invoke
    pub name: String,

    /// Arguments as a JSON object
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolInvocation {
    /// Create an invocation with a fresh call id.
    pub fn new(name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            args,
        }
    }

    /// Create an invocation with an explicit call id.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, args: ToolArgs) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            args,
        }
    }
}

/// One unit of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Turn {
    /// Plain text from the user or the model
    Text { role: Role, text: String },

    /// A tool call requested by the model
    ToolCall { call: ToolInvocation },

    /// The answer to the tool call with the same id
    ToolResult {
        id: String,
        name: String,
        result: String,
    },
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Turn::Text {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Turn::Text {
            role: Role::Model,
            text: text.into(),
        }
    }

    /// Build the result turn answering `call`.
    pub fn result_for(call: &ToolInvocation, result: impl Into<String>) -> Self {
        Turn::ToolResult {
            id: call.id.clone(),
            name: call.name.clone(),
            result: result.into(),
        }
    }

    /// Tool calls are authored by the model, tool results travel as user content.
    pub fn role(&self) -> Role {
        match self {
            Turn::Text { role, .. } => *role,
            Turn::ToolCall { .. } => Role::Model,
            Turn::ToolResult { .. } => Role::User,
        }
    }

    /// The text payload, if this is a text turn.
    pub fn text(&self) -> Option<&str> {
        match self {
            Turn::Text { text, .. } => Some(text),
            _ => None,
        }
    }

    /// Whether `next` is the result paired with this tool call.
    pub fn is_answered_by(&self, next: &Turn) -> bool {
        match (self, next) {
            (Turn::ToolCall { call }, Turn::ToolResult { id, .. }) => &call.id == id,
            _ => false,
        }
    }

    /// Rough token estimate (4 chars ≈ 1 token).
    pub fn estimated_tokens(&self) -> usize {
        let len = match self {
            Turn::Text { text, .. } => text.len(),
            Turn::ToolCall { call } => {
                call.name.len() + serde_json::Value::Object(call.args.clone()).to_string().len()
            }
            Turn::ToolResult { result, .. } => result.len(),
        };
        len / 4
    }
}
