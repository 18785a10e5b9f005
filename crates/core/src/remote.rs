//! Remote tool sessions: tools served by another process.
//!
//! The agent loop consults a remote session only for names the local
//! registry does not know.

use async_trait::async_trait;
use crate::error::ToolError;
use crate::tool::ToolDeclaration;
use crate::turn::ToolArgs;

/// A long-lived session exposing additional tools.
#[async_trait]
pub trait RemoteToolSession: Send + Sync {
    /// Declarations of every tool this session serves.
    fn tool_declarations(&self) -> Vec<ToolDeclaration>;

    /// Whether `name` is served by this session.
    fn has_tool(&self, name: &str) -> bool;

    /// Call a tool and return its textual result.
    async fn call(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError>;

    /// Release the session's resources. Must not fail loudly.
    async fn cleanup(&self);
}
