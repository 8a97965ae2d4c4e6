//! Server lifecycle management.
//!
//! Handles connecting to tool servers (spawning stdio child processes or
//! opening SSE streams), the initialization handshake, tool listing, and
//! shutdown.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::sse_transport::SseTransport;
use super::transport::{extract_result, StdioTransport, Transport};
use super::types::{
    CallToolResult, InitializeResult, ListToolsResult, McpTool, ServerConfig, PROTOCOL_VERSION,
};

// ─── Constants ───────────────────────────────────────────────────────────────

/// Timeout for the initialize handshake.
const INIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for listing a server's tools.
pub(crate) const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for graceful shutdown before force-killing.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for a failed child's stderr.
const STDERR_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Longest stderr excerpt carried in an init error.
const STDERR_MAX_CHARS: usize = 2000;

/// Client identity declared during the handshake.
const CLIENT_NAME: &str = "spotlight-host";

// ─── ManagedServer ───────────────────────────────────────────────────────────

/// A connected, initialized tool server.
pub struct ManagedServer {
    /// Server name from the configuration (e.g., "filesystem").
    pub name: String,
    /// JSON-RPC transport.
    transport: Transport,
    /// Child process handle (stdio servers only).
    process: Mutex<Option<Child>>,
}

impl ManagedServer {
    /// List every tool the server advertises, following pagination cursors.
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let params = cursor
                .as_ref()
                .map(|c| serde_json::json!({ "cursor": c }));
            let response = self.transport.request("tools/list", params).await?;
            let page: ListToolsResult =
                serde_json::from_value(extract_result(response)?).map_err(|e| {
                    McpError::TransportError {
                        server: self.name.clone(),
                        reason: format!("failed to parse tools/list response: {e}"),
                    }
                })?;

            tools.extend(page.tools);
            match page.next_cursor {
                Some(next) if !next.is_empty() && cursor.as_deref() != Some(next.as_str()) => {
                    cursor = Some(next);
                }
                _ => break,
            }
        }

        Ok(tools)
    }

    /// Invoke `tool` (un-namespaced) with the given arguments.
    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<CallToolResult, McpError> {
        let params = serde_json::json!({
            "name": tool,
            "arguments": arguments,
        });
        let response = self.transport.request("tools/call", Some(params)).await?;
        serde_json::from_value(extract_result(response)?).map_err(|e| McpError::TransportError {
            server: self.name.clone(),
            reason: format!("failed to parse tools/call response: {e}"),
        })
    }

    /// Close the connection. Stdio servers get EOF on stdin, then a kill if
    /// they have not exited within the shutdown timeout.
    pub async fn shutdown(&self) -> Result<(), McpError> {
        match &self.transport {
            Transport::Sse(sse) => {
                sse.close();
                Ok(())
            }
            Transport::Stdio(stdio) => {
                stdio.close_stdin().await;
                let mut guard = self.process.lock().await;
                let Some(process) = guard.as_mut() else {
                    return Ok(());
                };
                match tokio::time::timeout(SHUTDOWN_TIMEOUT, process.wait()).await {
                    Ok(Ok(_)) => Ok(()),
                    _ => process.kill().await.map_err(|e| McpError::TransportError {
                        server: self.name.clone(),
                        reason: format!("failed to kill server process: {e}"),
                    }),
                }
            }
        }
    }
}

// ─── Connecting ──────────────────────────────────────────────────────────────

/// Connect to one server according to its config and run the handshake.
pub async fn start_server(name: &str, config: &ServerConfig) -> Result<ManagedServer, McpError> {
    match config {
        ServerConfig::Stdio { command, args, env } => {
            spawn_stdio_server(name, command, args, env).await
        }
        ServerConfig::Sse { url, headers } => connect_sse_server(name, url, headers).await,
    }
}

/// Spawn a stdio server process and perform the initialization handshake.
///
/// The child inherits this process's environment plus `env`. On a failed
/// handshake the child is killed and its stderr is appended to the error.
pub async fn spawn_stdio_server(
    name: &str,
    command: &str,
    args: &[String],
    env: &HashMap<String, String>,
) -> Result<ManagedServer, McpError> {
    let spawn_failed = |reason: String| McpError::SpawnFailed {
        name: name.to_string(),
        reason,
    };

    let mut child = Command::new(command)
        .args(args)
        .envs(env)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| spawn_failed(format!("{command}: {e}")))?;

    let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
        return Err(spawn_failed("child stdio was not piped".into()));
    };
    let stderr = child.stderr.take();
    let transport = Transport::Stdio(StdioTransport::new(name, stdin, stdout));

    if let Err(reason) = handshake(&transport, name).await {
        let _ = child.kill().await;
        let tail = stderr_tail(stderr).await;
        return Err(McpError::InitFailed {
            name: name.to_string(),
            reason: if tail.is_empty() {
                reason
            } else {
                format!("{reason} | stderr: {tail}")
            },
        });
    }

    Ok(ManagedServer {
        name: name.to_string(),
        transport,
        process: Mutex::new(Some(child)),
    })
}

/// Open an SSE connection and perform the initialization handshake.
///
/// Credential rejections keep their `Unauthorized` shape.
pub async fn connect_sse_server(
    name: &str,
    url: &str,
    headers: &[String],
) -> Result<ManagedServer, McpError> {
    let transport = Transport::Sse(SseTransport::connect(name, url, headers).await?);

    match tokio::time::timeout(INIT_TIMEOUT, initialize(&transport, name)).await {
        Ok(Ok(())) => {}
        Ok(Err(e @ McpError::Unauthorized { .. })) => return Err(e),
        Ok(Err(e)) => {
            return Err(McpError::InitFailed {
                name: name.to_string(),
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(McpError::InitFailed {
                name: name.to_string(),
                reason: init_timeout_reason(),
            })
        }
    }

    Ok(ManagedServer {
        name: name.to_string(),
        transport,
        process: Mutex::new(None),
    })
}

/// Run [`initialize`] under [`INIT_TIMEOUT`], flattening failures to text.
async fn handshake(transport: &Transport, name: &str) -> Result<(), String> {
    match tokio::time::timeout(INIT_TIMEOUT, initialize(transport, name)).await {
        Ok(outcome) => outcome.map_err(|e| e.to_string()),
        Err(_) => Err(init_timeout_reason()),
    }
}

fn init_timeout_reason() -> String {
    format!("initialization timed out after {}s", INIT_TIMEOUT.as_secs())
}

/// Whatever the failed child wrote to stderr, trimmed and capped.
async fn stderr_tail(stderr: Option<ChildStderr>) -> String {
    let Some(mut stderr) = stderr else {
        return String::new();
    };
    let mut buf = String::new();
    let read = tokio::time::timeout(STDERR_READ_TIMEOUT, stderr.read_to_string(&mut buf)).await;
    if !matches!(read, Ok(Ok(_))) {
        return String::new();
    }

    let text = buf.trim();
    match text.char_indices().nth(STDERR_MAX_CHARS) {
        Some((cut, _)) => format!("{}...(truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

/// Perform the protocol handshake: `initialize`, then `notifications/initialized`.
async fn initialize(transport: &Transport, server_name: &str) -> Result<(), McpError> {
    let params = serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": CLIENT_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        },
    });
    let response = transport.request("initialize", Some(params)).await?;
    let result = extract_result(response)?;

    let init: InitializeResult =
        serde_json::from_value(result).map_err(|e| McpError::InitFailed {
            name: server_name.to_string(),
            reason: format!("failed to parse initialize response: {e}"),
        })?;

    tracing::debug!(
        server = server_name,
        protocol = init.protocol_version.as_deref().unwrap_or("unknown"),
        remote_name = init.server_info.as_ref().and_then(|i| i.name.as_deref()).unwrap_or("unknown"),
        remote_version = init.server_info.as_ref().and_then(|i| i.version.as_deref()).unwrap_or("unknown"),
        "handshake complete"
    );

    transport.notify("notifications/initialized", None).await
}

// ─── Batch Operations ────────────────────────────────────────────────────────

/// Connect to all configured servers concurrently.
///
/// Servers that fail to start are returned in the error list and left out of
/// the map.
pub async fn start_all_servers(
    configs: &HashMap<String, ServerConfig>,
) -> (HashMap<String, ManagedServer>, Vec<(String, McpError)>) {
    let tasks: Vec<_> = configs
        .iter()
        .map(|(name, config)| {
            tracing::info!(server = %name, transport = config.transport_name(), "starting tool server");
            let task = tokio::spawn({
                let (name, config) = (name.clone(), config.clone());
                async move { start_server(&name, &config).await }
            });
            (name.clone(), task)
        })
        .collect();

    let mut servers = HashMap::new();
    let mut errors = Vec::new();
    for (name, task) in tasks {
        let outcome = task.await.unwrap_or_else(|e| {
            Err(McpError::SpawnFailed {
                name: name.clone(),
                reason: format!("startup task failed: {e}"),
            })
        });
        match outcome {
            Ok(server) => {
                servers.insert(name, server);
            }
            Err(e) => errors.push((name, e)),
        }
    }

    (servers, errors)
}

// ─── Tests ───────────────────────────────────────────────────────────────────
