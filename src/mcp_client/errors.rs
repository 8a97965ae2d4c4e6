//! MCP Client error types.

use thiserror::Error;

/// Errors that can occur during MCP client operations.
#[derive(Debug, Error)]
pub enum McpError {
    /// A server process failed to start.
    #[error("failed to spawn server '{name}': {reason}")]
    SpawnFailed {
        name: String,
        reason: String,
    },

    /// The SSE endpoint could not be reached or never announced its POST endpoint.
    #[error("failed to connect to server '{name}': {reason}")]
    ConnectFailed {
        name: String,
        reason: String,
    },

    /// The initialization handshake failed.
    #[error("server '{name}' initialization failed: {reason}")]
    InitFailed {
        name: String,
        reason: String,
    },

    /// JSON-RPC communication error (malformed message, I/O error).
    #[error("transport error for server '{server}': {reason}")]
    TransportError {
        server: String,
        reason: String,
    },

    /// The server rejected our credentials (HTTP 401/403).
    #[error("server '{server}' requires authorization (HTTP {status})")]
    Unauthorized {
        server: String,
        status: u16,
    },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i32,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// No connection is registered under this server name.
    #[error("unknown server: '{name}'")]
    UnknownServer {
        name: String,
    },

    /// Tool name is not of the form `<server>__<tool>`.
    #[error("invalid tool name format: '{name}'")]
    InvalidToolName {
        name: String,
    },

    /// A request timed out.
    #[error("'{operation}' on server '{server}' timed out after {timeout_ms}ms")]
    Timeout {
        server: String,
        operation: String,
        timeout_ms: u64,
    },

    /// Configuration error (bad config file, invalid entry).
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl McpError {
    /// Whether this error means the server wants different credentials.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, McpError::Unauthorized { .. })
    }
}
