use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::protocol::*;
use crate::{McpConnection, McpError};

const RESPONSE_TIMEOUT: Duration = Duration::from_secs(60);

/// An MCP server child process spoken to over stdin/stdout JSON-RPC.
pub struct StdioMcpServer {
    server_id: String,
    next_id: AtomicU64,
    stdin: Mutex<ChildStdin>,
    stdout: Mutex<BufReader<ChildStdout>>,
    child: Mutex<Option<Child>>,
}

impl StdioMcpServer {
    /// Spawn the server and perform the initialize handshake.
    pub async fn spawn(
        server_id: &str,
        command: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, McpError> {
        let (program, args) = command
            .split_first()
            .ok_or_else(|| McpError::SpawnFailed("empty command".into()))?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| McpError::SpawnFailed(format!("failed to spawn '{program}': {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdin".into()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| McpError::SpawnFailed("failed to capture stdout".into()))?;

        let server = Self {
            server_id: server_id.to_string(),
            next_id: AtomicU64::new(1),
            stdin: Mutex::new(stdin),
            stdout: Mutex::new(BufReader::new(stdout)),
            child: Mutex::new(Some(child)),
        };

        server.initialize().await?;
        Ok(server)
    }

    async fn initialize(&self) -> Result<(), McpError> {
        let params = InitializeParams {
            protocol_version: PROTOCOL_VERSION.into(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: "gemcode".into(),
                version: env!("CARGO_PKG_VERSION").into(),
            },
        };

        let response = self
            .request(methods::INITIALIZE, Some(serde_json::to_value(&params)?))
            .await?;
        info!(
            server_id = %self.server_id,
            server = %response["serverInfo"]["name"].as_str().unwrap_or("unknown"),
            "MCP server initialized"
        );

        self.write_line(&JsonRpcRequest::notification(methods::INITIALIZED))
            .await
    }

    async fn write_line(&self, message: &JsonRpcRequest) -> Result<(), McpError> {
        let mut line = serde_json::to_string(message)?;
        line.push('\n');

        let mut stdin = self.stdin.lock().await;
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        Ok(())
    }

    /// Send a request and wait for the response with the same id.
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write_line(&JsonRpcRequest::new(id, method, params)).await?;

        let response = tokio::time::timeout(RESPONSE_TIMEOUT, self.read_response(id))
            .await
            .map_err(|_| McpError::Timeout)??;

        response.into_result()
    }

    /// Read stdout lines until the response matching `expected_id` shows up.
    async fn read_response(&self, expected_id: u64) -> Result<JsonRpcResponse, McpError> {
        let mut stdout = self.stdout.lock().await;
        let mut buf = String::new();
        loop {
            buf.clear();
            let n = stdout.read_line(&mut buf).await?;
            if n == 0 {
                return Err(McpError::Transport("server closed stdout".into()));
            }
            let trimmed = buf.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(resp) if resp.id == Some(expected_id) => return Ok(resp),
                Ok(_) => debug!(server_id = %self.server_id, "Skipping unrelated MCP message"),
                Err(_) => debug!(server_id = %self.server_id, line = %trimmed, "Skipping non-JSON-RPC output"),
            }
        }
    }
}

#[async_trait]
impl McpConnection for StdioMcpServer {
    fn server_id(&self) -> &str {
        &self.server_id
    }

    async fn list_tools(&self) -> Result<Vec<McpToolDefinition>, McpError> {
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let list: ListToolsResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    async fn call_tool(
        &self,
        name: &str,
        arguments: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolCallResult, McpError> {
        let params = ToolCallParams { name, arguments };
        let result = self
            .request(methods::TOOLS_CALL, Some(serde_json::to_value(&params)?))
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn shutdown(&self) -> Result<(), McpError> {
        let mut guard = self.child.lock().await;
        if let Some(mut child) = guard.take() {
            if let Err(e) = child.kill().await {
                warn!(server_id = %self.server_id, error = %e, "Failed to kill MCP server");
                return Err(McpError::Io(e));
            }
            info!(server_id = %self.server_id, "MCP server stopped");
        }
        Ok(())
    }
}
