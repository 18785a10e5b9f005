//! Remote tool sessions over the Model Context Protocol.
//!
//! Each configured server is started as a child process speaking
//! newline-delimited JSON-RPC on stdin/stdout. Their tools are merged into
//! one `McpToolSet`, which the agent loop consults for any tool name the
//! local registry does not know.

mod protocol;
mod session;

pub use protocol::{JsonRpcRequest, JsonRpcResponse, McpToolDefinition, ToolCallResult};
pub use session::StdioMcpServer;

use async_trait::async_trait;
use gemcode_config::McpServerConfig;
use gemcode_core::error::ToolError;
use gemcode_core::remote::RemoteToolSession;
use gemcode_core::tool::ToolDeclaration;
use gemcode_core::turn::ToolArgs;
use std::collections::HashMap;
use tracing::{info, warn};

#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("server spawn failed: {0}")]
    SpawnFailed(String),

    #[error("timeout waiting for server response")]
    Timeout,
}

/// One live connection to an MCP server.
#[async_trait]
pub trait McpConnection: Send + Sync {
    fn server_id(&self) -> &str;

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError>;

    async fn call_tool(
        &self,
        name: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolCallResult, McpError>;

    async fn shutdown(&self) -> Result<(), McpError>;
}

/// All remote tools, routed to the server that declared them.
pub struct McpToolSet {
    connections: Vec<Box<dyn McpConnection>>,
    declarations: Vec<ToolDeclaration>,
    routes: HashMap<String, usize>,
}

impl McpToolSet {
    /// An empty set; used when no servers are configured.
    pub fn empty() -> Self {
        Self {
            connections: Vec::new(),
            declarations: Vec::new(),
            routes: HashMap::new(),
        }
    }

    /// Start every configured server. A server that fails to start or to
    /// list its tools is logged and skipped.
    pub async fn connect(servers: &HashMap<String, McpServerConfig>) -> Self {
        let mut ids: Vec<&String> = servers.keys().collect();
        ids.sort();

        let mut connections: Vec<Box<dyn McpConnection>> = Vec::new();
        for id in ids {
            let config = &servers[id];
            match StdioMcpServer::spawn(id, &config.command, &config.env).await {
                Ok(server) => connections.push(Box::new(server)),
                Err(e) => warn!(server_id = %id, error = %e, "Skipping MCP server that failed to start"),
            }
        }

        Self::from_connections(connections).await
    }

    /// Build the set from already-open connections. Tool names are unique
    /// across the set; on a clash the first server wins.
    pub async fn from_connections(connections: Vec<Box<dyn McpConnection>>) -> Self {
        let mut kept: Vec<Box<dyn McpConnection>> = Vec::new();
        let mut declarations = Vec::new();
        let mut routes = HashMap::new();

        for conn in connections {
            let tools = match conn.list_tools().await {
                Ok(tools) => tools,
                Err(e) => {
                    warn!(server_id = %conn.server_id(), error = %e, "Skipping MCP server whose tools could not be listed");
                    if let Err(e) = conn.shutdown().await {
                        warn!(server_id = %conn.server_id(), error = %e, "MCP shutdown failed");
                    }
                    continue;
                }
            };

            let slot = kept.len();
            for tool in tools {
                if routes.contains_key(&tool.name) {
                    warn!(server_id = %conn.server_id(), tool = %tool.name, "Duplicate MCP tool name ignored");
                    continue;
                }
                routes.insert(tool.name.clone(), slot);
                declarations.push(ToolDeclaration::from_json_schema(
                    &tool.name,
                    &tool.description,
                    &tool.input_schema,
                ));
            }
            info!(server_id = %conn.server_id(), tools = routes.values().filter(|s| **s == slot).count(), "MCP server ready");
            kept.push(conn);
        }

        Self {
            connections: kept,
            declarations,
            routes,
        }
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

#[async_trait]
impl RemoteToolSession for McpToolSet {
    fn tool_declarations(&self) -> Vec<ToolDeclaration> {
        self.declarations.clone()
    }

    fn has_tool(&self, name: &str) -> bool {
        self.routes.contains_key(name)
    }

    async fn call(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        let slot = *self
            .routes
            .get(name)
            .ok_or_else(|| ToolError::Unknown(name.to_string()))?;
        let conn = &self.connections[slot];

        let result = conn
            .call_tool(name, args)
            .await
            .map_err(|e| ToolError::Remote(format!("{}: {e}", conn.server_id())))?;

        if result.is_error {
            return Err(ToolError::Remote(result.text()));
        }
        Ok(result.text())
    }

    async fn cleanup(&self) {
        for conn in &self.connections {
            if let Err(e) = conn.shutdown().await {
                warn!(server_id = %conn.server_id(), error = %e, "MCP shutdown failed");
            }
        }
    }
}
