//! MCP Client — high-level interface for tool execution.
//!
//! Owns one connection per tool server, caches each server's namespaced tool
//! list, and dispatches tool calls. This is the API the engine's tool router
//! calls into.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use super::errors::McpError;
use super::lifecycle::{self, ManagedServer, LIST_TOOLS_TIMEOUT};
use super::types::{split_tool_name, CallToolResult, McpServersConfig, McpTool, ToolCallResult};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Default timeout for tool call execution.
const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(30);

// ─── ToolServer ──────────────────────────────────────────────────────────────

/// One initialized tool server, whatever its transport.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// Tools the server advertises, with their bare (un-namespaced) names.
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError>;

    /// Invoke a tool by its bare name.
    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CallToolResult, McpError>;

    /// Close the underlying transport.
    async fn close(&self) -> Result<(), McpError>;
}

#[async_trait]
impl ToolServer for ManagedServer {
    async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        ManagedServer::list_tools(self).await
    }

    async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CallToolResult, McpError> {
        ManagedServer::call_tool(self, tool, arguments).await
    }

    async fn close(&self) -> Result<(), McpError> {
        self.shutdown().await
    }
}

// ─── McpClient ───────────────────────────────────────────────────────────────

/// Connections to every running tool server, keyed by server name.
pub struct McpClient {
    servers: HashMap<String, Arc<dyn ToolServer>>,
    /// Namespaced tools per server, discovered once when the server is added.
    tools: HashMap<String, Vec<McpTool>>,
    call_timeout: Duration,
}

impl Default for McpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl McpClient {
    /// Create a client with no servers.
    pub fn new() -> Self {
        Self {
            servers: HashMap::new(),
            tools: HashMap::new(),
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Set the tool call timeout.
    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Start every enabled server in `config` and discover its tools.
    ///
    /// Returns the servers that failed to start (partial startup is OK).
    pub async fn start_all(&mut self, config: &McpServersConfig) -> Vec<(String, McpError)> {
        let enabled = config.enabled_servers();
        let skipped = config.servers.len() - enabled.len();
        if skipped > 0 {
            tracing::info!(skipped, "skipping disabled tool servers");
        }

        let (servers, errors) = lifecycle::start_all_servers(&enabled).await;

        for (name, error) in &errors {
            tracing::error!(server = %name, error = %error, "tool server failed to start");
        }

        for (name, server) in servers {
            self.add_server(&name, Arc::new(server)).await;
        }

        errors
    }

    /// Register an initialized server and cache its namespaced tools.
    ///
    /// A server whose listing fails stays connected with no tools.
    pub async fn add_server(&mut self, name: &str, server: Arc<dyn ToolServer>) {
        let tools = match tokio::time::timeout(LIST_TOOLS_TIMEOUT, server.list_tools()).await {
            Ok(Ok(tools)) => tools.iter().map(|t| t.namespaced(name)).collect(),
            Ok(Err(e)) => {
                tracing::warn!(server = name, error = %e, "failed to list tools");
                Vec::new()
            }
            Err(_) => {
                tracing::warn!(
                    server = name,
                    timeout_ms = LIST_TOOLS_TIMEOUT.as_millis() as u64,
                    "listing tools timed out"
                );
                Vec::new()
            }
        };

        tracing::info!(server = name, tools = tools.len(), "tool server ready");
        self.tools.insert(name.to_string(), tools);
        self.servers.insert(name.to_string(), server);
    }

    /// Close every server. One failing close does not stop the rest.
    pub async fn shutdown_all(&self) {
        for (name, server) in &self.servers {
            match server.close().await {
                Ok(()) => tracing::info!(server = %name, "tool server closed"),
                Err(e) => tracing::warn!(server = %name, error = %e, "failed to close tool server"),
            }
        }
    }

    // ─── Queries ─────────────────────────────────────────────────────────

    /// Names of all connected servers.
    pub fn server_names(&self) -> Vec<&str> {
        self.servers.keys().map(String::as_str).collect()
    }

    /// Tools of one server, renamed to `"<server>__<tool>"`.
    pub fn list_tools(&self, server: &str) -> Result<&[McpTool], McpError> {
        self.tools
            .get(server)
            .map(Vec::as_slice)
            .ok_or_else(|| McpError::UnknownServer {
                name: server.to_string(),
            })
    }

    /// Every namespaced tool across all servers, sorted by name.
    pub fn all_tools(&self) -> Vec<McpTool> {
        let mut all: Vec<McpTool> = self.tools.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    // ─── Tool Execution ──────────────────────────────────────────────────

    /// Call `tool` (bare name) on `server`.
    ///
    /// Failures are reported, never retried here.
    pub async fn call_tool(
        &self,
        server: &str,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolCallResult, McpError> {
        let connection = self.servers.get(server).ok_or_else(|| McpError::UnknownServer {
            name: server.to_string(),
        })?;

        let start = Instant::now();
        let outcome = tokio::time::timeout(self.call_timeout, connection.call_tool(tool, arguments))
            .await
            .map_err(|_| McpError::Timeout {
                server: server.to_string(),
                operation: format!("tools/call {tool}"),
                timeout_ms: self.call_timeout.as_millis() as u64,
            })
            .and_then(|r| r);
        let elapsed = start.elapsed().as_millis() as u64;

        match outcome {
            Ok(result) => {
                tracing::info!(
                    server,
                    tool,
                    duration_ms = elapsed,
                    is_error = result.is_error,
                    "tool call completed"
                );
                Ok(ToolCallResult {
                    server_name: server.to_string(),
                    tool_name: tool.to_string(),
                    content: result.content,
                    is_error: result.is_error,
                    execution_time_ms: elapsed,
                })
            }
            Err(e) => {
                tracing::warn!(server, tool, duration_ms = elapsed, error = %e, "tool call failed");
                Err(e)
            }
        }
    }

    /// Call a tool by its namespaced `"<server>__<tool>"` name.
    pub async fn call_namespaced(
        &self,
        namespaced: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolCallResult, McpError> {
        let (server, tool) = split_tool_name(namespaced).ok_or_else(|| McpError::InvalidToolName {
            name: namespaced.to_string(),
        })?;
        self.call_tool(server, tool, arguments).await
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
