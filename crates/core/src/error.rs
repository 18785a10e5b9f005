//! Error types for the gemcode domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error type.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError {
        status_code: u16,
        message: String,
    },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Cache operation failed: {0}")]
    Cache(String),

    #[error("Network error: {0}")]
    Network(String),
}

/// Errors raised while dispatching a tool call.
///
/// None of these are fatal: the agent loop renders every variant into a
/// result string so the model can see its own mistake and retry.
#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Unknown function call: {0}")]
    Unknown(String),

    #[error("Invalid arguments for {tool}: {reason}")]
    BadArgs { tool: String, reason: String },

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("Tool timed out: {tool_name} after {timeout_secs}s")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Remote tool error: {0}")]
    Remote(String),
}

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to read history at {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("Failed to write history at {path}: {reason}")]
    Write { path: String, reason: String },
}
