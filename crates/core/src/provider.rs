//! Model client trait: the abstraction over the hosted model API.
//!
//! A model client sends a conversation to the model and returns its
//! candidates, and manages server-side cached contexts (system prompt plus
//! tool declarations prepared once and referenced by name afterwards).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::error::ProviderError;
use crate::tool::ToolDeclaration;
use crate::turn::{ToolInvocation, Turn};

/// Whether the model may call tools on this request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ToolMode {
    /// The model decides
    #[default]
    Auto,
    /// Tool calling is disabled; the model must answer in text
    None,
}

/// Thinking-channel settings for models that support it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThinkingConfig {
    /// Token budget for internal reasoning (0 disables thinking)
    pub budget: u32,
    /// Whether thought summaries are returned as parts
    pub include_thoughts: bool,
}

/// Per-call generation settings.
///
/// Built fresh for every model invocation and never mutated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateConfig {
    /// Temperature (0.0 = deterministic)
    pub temperature: f32,

    /// Tool-calling mode
    #[serde(default)]
    pub tool_mode: ToolMode,

    /// Inline tool declarations (ignored when `cached_content` is set)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDeclaration>,

    /// Inline system instruction (ignored when `cached_content` is set)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<String>,

    /// Server-side cached context to use instead of inline instruction/tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached_content: Option<String>,

    /// Structured-output schema
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_schema: Option<serde_json::Value>,

    /// Structured-output mime type (e.g. "application/json")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_mime_type: Option<String>,

    /// Thinking channel configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

impl GenerateConfig {
    /// A bare config: no tools, no cache, no structured output.
    pub fn plain(temperature: f32) -> Self {
        Self {
            temperature,
            tool_mode: ToolMode::None,
            tools: Vec::new(),
            system_instruction: None,
            cached_content: None,
            response_schema: None,
            response_mime_type: None,
            thinking: None,
        }
    }
}

/// A complete request to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The model id (e.g. "gemini-2.5-flash")
    pub model: String,

    /// The conversation, in order
    pub contents: Vec<Turn>,

    /// Per-call configuration
    pub config: GenerateConfig,
}

/// One piece of a candidate's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Part {
    /// Text; `thought` marks the internal reasoning channel
    Text {
        text: String,
        #[serde(default)]
        thought: bool,
    },
    /// A function call
    ToolCall(ToolInvocation),
}

impl Part {
    pub fn text(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            thought: false,
        }
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Part::Text {
            text: text.into(),
            thought: true,
        }
    }
}

/// One candidate answer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub parts: Vec<Part>,

    /// Why generation stopped ("STOP", "MAX_TOKENS", "SAFETY", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Token usage information.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete response from the model.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl ModelResponse {
    /// Parts of the first candidate (empty when there is none).
    pub fn parts(&self) -> &[Part] {
        self.candidates.first().map(|c| c.parts.as_slice()).unwrap_or(&[])
    }

    /// Finish reason of the first candidate, or "NO_CANDIDATES".
    pub fn finish_reason(&self) -> &str {
        match self.candidates.first() {
            Some(c) => c.finish_reason.as_deref().unwrap_or("UNSPECIFIED"),
            None => "NO_CANDIDATES",
        }
    }

    /// Concatenated non-thought text of the first candidate.
    pub fn text(&self) -> String {
        self.parts()
            .iter()
            .filter_map(|p| match p {
                Part::Text { text, thought: false } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

/// What to put into a server-side cached context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheRequest {
    pub model: String,
    pub system_instruction: String,
    pub tools: Vec<ToolDeclaration>,
    pub ttl: Duration,
}

/// Reference to a server-side cached context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheHandle {
    /// Server-assigned resource name (e.g. "cachedContents/abc123")
    pub name: String,

    /// When the server will drop it
    pub expires_at: DateTime<Utc>,
}

impl CacheHandle {
    /// Whether the handle expires within `margin` of `now`.
    pub fn expires_within(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        let margin = chrono::Duration::from_std(margin).unwrap_or(chrono::Duration::zero());
        self.expires_at <= now + margin
    }
}

/// The model client trait.
///
/// The agent loop, the continuation judge and the summarizer all talk to
/// the model through this trait without knowing which backend serves it.
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// A human-readable name for this client (e.g. "gemini").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(&self, request: GenerateRequest) -> Result<ModelResponse, ProviderError>;

    /// Create a cached context.
    ///
    /// Default implementation reports caching as unsupported.
    async fn create_cache(&self, _request: CacheRequest) -> Result<CacheHandle, ProviderError> {
        Err(ProviderError::NotConfigured(format!(
            "'{}' does not support cached contexts",
            self.name()
        )))
    }

    /// Delete a cached context.
    async fn delete_cache(&self, _handle: &CacheHandle) -> Result<(), ProviderError> {
        Ok(())
    }
}
