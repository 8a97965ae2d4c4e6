//! JSON-RPC transports.
//!
//! - [`StdioTransport`]: line-delimited JSON over a child process's stdio
//! - [`SseTransport`](super::sse_transport::SseTransport): HTTP POST out,
//!   server-sent events back
//!
//! [`Transport`] lets the session layer talk to either without caring which.

use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{ChildStdin, ChildStdout};
use tokio::sync::Mutex;

use super::errors::McpError;
use super::sse_transport::SseTransport;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Request ID Generator ────────────────────────────────────────────────────

/// Global monotonic request ID counter.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique request ID.
pub fn next_request_id() -> u64 {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

// ─── Transport ───────────────────────────────────────────────────────────────

/// A connected JSON-RPC channel to one tool server.
pub enum Transport {
    Stdio(StdioTransport),
    Sse(SseTransport),
}

impl Transport {
    /// Send a request and wait for the response with the same id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        match self {
            Transport::Stdio(t) => t.request(method, params).await,
            Transport::Sse(t) => t.request(method, params).await,
        }
    }

    /// Send a notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        match self {
            Transport::Stdio(t) => t.notify(method, params).await,
            Transport::Sse(t) => t.notify(method, params).await,
        }
    }
}

/// Bi-directional JSON-RPC transport over a child process's stdio.
pub struct StdioTransport {
    server_name: String,
    /// `None` once stdin has been closed for shutdown.
    writer: Mutex<Option<ChildStdin>>,
    reader: Mutex<BufReader<ChildStdout>>,
}

impl StdioTransport {
    /// Create a new transport from a child process's stdin/stdout.
    pub fn new(server_name: &str, stdin: ChildStdin, stdout: ChildStdout) -> Self {
        Self {
            server_name: server_name.to_string(),
            writer: Mutex::new(Some(stdin)),
            reader: Mutex::new(BufReader::new(stdout)),
        }
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// Write one line of JSON to the child's stdin.
    async fn write_line(&self, mut json: String) -> Result<(), McpError> {
        json.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard
            .as_mut()
            .ok_or_else(|| self.transport_error("stdin already closed".into()))?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| self.transport_error(format!("failed to write to stdin: {e}")))?;
        writer
            .flush()
            .await
            .map_err(|e| self.transport_error(format!("failed to flush stdin: {e}")))?;
        Ok(())
    }

    /// Send a request and read stdout until the response carrying its id.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let line = serde_json::to_string(&JsonRpcRequest::new(id, method, params))
            .map_err(|e| self.transport_error(format!("cannot encode {method} request: {e}")))?;
        self.write_line(line).await?;

        let mut reader = self.reader.lock().await;
        let mut buf = String::new();
        loop {
            buf.clear();
            let read = reader
                .read_line(&mut buf)
                .await
                .map_err(|e| self.transport_error(format!("stdout read failed: {e}")))?;
            if read == 0 {
                return Err(self.transport_error("stdout closed before a response arrived".into()));
            }
            if let Some(response) = self.parse_line(buf.trim(), id) {
                return Ok(response);
            }
        }
    }

    /// The response for `id` on this line, if it is one. Log output, server
    /// requests and replies to other ids yield `None`.
    fn parse_line(&self, line: &str, id: u64) -> Option<JsonRpcResponse> {
        if line.is_empty() {
            return None;
        }
        match JsonRpcResponse::from_frame(line) {
            Some(response) => (response.id == id).then_some(response),
            None => {
                tracing::trace!(server = %self.server_name, line, "ignoring non-response stdout line");
                None
            }
        }
    }

    /// Send a JSON-RPC notification (no response expected).
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        let notification = JsonRpcNotification::new(method, params);
        let json = serde_json::to_string(&notification).map_err(|e| {
            self.transport_error(format!("failed to serialize notification: {e}"))
        })?;
        self.write_line(json).await
    }

    /// Close stdin so the server sees EOF and can exit on its own.
    pub async fn close_stdin(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(mut stdin) = guard.take() {
            let _ = stdin.shutdown().await;
        }
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// Extract the result from a JSON-RPC response, converting errors to `McpError`.
pub fn extract_result(response: JsonRpcResponse) -> Result<serde_json::Value, McpError> {
    if let Some(err) = response.error {
        return Err(McpError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    response.result.ok_or(McpError::ServerError {
        code: super::types::error_codes::INTERNAL_ERROR,
        message: "response missing both result and error".into(),
        data: None,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp_client::types::{error_codes, JsonRpcError};

    #[test]
    fn test_next_request_id_is_monotonic() {
        let id1 = next_request_id();
        let id2 = next_request_id();
        assert!(id2 > id1);
    }

    fn response(result: Option<serde_json::Value>, error: Option<JsonRpcError>) -> JsonRpcResponse {
        JsonRpcResponse {
            jsonrpc: "2.0".into(),
            id: 7,
            result,
            error,
        }
    }

    #[test]
    fn test_result_payload_is_returned() {
        let value = extract_result(response(Some(serde_json::json!({"tools": []})), None)).unwrap();
        assert!(value["tools"].is_array());
    }

    #[test]
    fn test_error_payload_becomes_server_error() {
        let err = extract_result(response(
            None,
            Some(JsonRpcError {
                code: error_codes::METHOD_NOT_FOUND,
                message: "no such method".into(),
                data: None,
            }),
        ))
        .unwrap_err();
        assert!(matches!(err, McpError::ServerError { code, .. } if code == error_codes::METHOD_NOT_FOUND));
        assert_eq!(err.to_string(), format!("server error [{}]: no such method", error_codes::METHOD_NOT_FOUND));
    }

    #[test]
    fn test_empty_response_is_internal_error() {
        let err = extract_result(response(None, None)).unwrap_err();
        assert!(matches!(err, McpError::ServerError { code, .. } if code == error_codes::INTERNAL_ERROR));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_request_skips_log_lines() {
        // The script prints a log line and a server-side ping reusing the
        // request id, then answers with the id it read from the request.
        let script = r#"read line; echo "starting up"; id=$(echo "$line" | sed 's/.*"id":\([0-9]*\).*/\1/'); echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"method\":\"ping\"}"; echo "{\"jsonrpc\":\"2.0\",\"id\":$id,\"result\":{\"ok\":true}}""#;
        let mut child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .spawn()
            .unwrap();
        let transport = StdioTransport::new(
            "echo",
            child.stdin.take().unwrap(),
            child.stdout.take().unwrap(),
        );

        let resp = transport.request("ping", None).await.unwrap();
        assert_eq!(extract_result(resp).unwrap()["ok"], true);

        transport.close_stdin().await;
        let _ = child.wait().await;
    }
}
