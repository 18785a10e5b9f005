//! Console trait: the presentation boundary.
//!
//! The agent loop calls these hooks at fixed points of a turn; how they are
//! rendered (plain lines, colours, panels) is up to the implementation.

use serde_json::Value;

/// Rendering requests issued by the agent loop and the CLI.
pub trait Console: Send + Sync {
    /// Startup banner.
    fn welcome(&self);

    /// Prompt shown before reading the next user line.
    fn user_prompt(&self);

    /// A user-visible model answer.
    fn model_text(&self, text: &str);

    /// Internal reasoning from the thinking channel.
    fn thought(&self, text: &str);

    /// A tool call about to be dispatched.
    fn tool_call(&self, name: &str, args: &Value);

    /// A successful tool result.
    fn tool_result(&self, result: &str);

    /// A tool that failed or received bad arguments.
    fn tool_error(&self, error: &str);

    /// The model asked for a tool nobody provides.
    fn unknown_tool(&self, name: &str);

    /// Accumulated token count after a turn.
    fn token_count(&self, count: u64);

    /// Any other error, with optional diagnostic detail.
    fn error(&self, message: &str, detail: Option<&str>);

    /// Exit banner.
    fn exit(&self);
}

/// A console that renders nothing. Used for one-shot and headless runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullConsole;

impl Console for NullConsole {
    fn welcome(&self) {}
    fn user_prompt(&self) {}
    fn model_text(&self, _text: &str) {}
    fn thought(&self, _text: &str) {}
    fn tool_call(&self, _name: &str, _args: &Value) {}
    fn tool_result(&self, _result: &str) {}
    fn tool_error(&self, _error: &str) {}
    fn unknown_tool(&self, _name: &str) {}
    fn token_count(&self, _count: u64) {}
    fn error(&self, _message: &str, _detail: Option<&str>) {}
    fn exit(&self) {}
}
