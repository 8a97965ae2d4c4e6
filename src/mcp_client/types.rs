//! Shared types for the MCP client.
//!
//! JSON-RPC 2.0 message types, MCP protocol structures, and the
//! tool-server configuration model.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Separator between server and tool in a namespaced tool name.
pub const TOOL_NAME_SEPARATOR: &str = "__";

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// JSON-RPC 2.0 request message.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC request.
    pub fn new(id: u64, method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 notification (no `id`, no response expected).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<serde_json::Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 response message (success or error).
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: u64,
    pub result: Option<serde_json::Value>,
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Parse one frame from the server. Frames with a `method` are requests
    /// or notifications the server started, and anything else that is not a
    /// response yields `None`.
    pub fn from_frame(frame: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(frame).ok()?;
        if value.get("method").is_some() {
            return None;
        }
        serde_json::from_value(value).ok()
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

// ─── MCP Protocol Types ──────────────────────────────────────────────────────

/// Protocol revision declared in the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON schema describing a tool's input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
}

fn default_schema_type() -> String {
    "object".to_string()
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        Self {
            schema_type: default_schema_type(),
            properties: serde_json::Map::new(),
            required: Vec::new(),
        }
    }
}

/// MCP tool definition as returned by `tools/list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct McpTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, rename = "inputSchema", alias = "input_schema")]
    pub input_schema: ToolInputSchema,
}

impl McpTool {
    /// Copy of this tool renamed to `"<server>__<tool>"`.
    pub fn namespaced(&self, server_name: &str) -> McpTool {
        McpTool {
            name: namespaced_tool_name(server_name, &self.name),
            ..self.clone()
        }
    }
}

/// Build the globally unique name for a server's tool.
pub fn namespaced_tool_name(server_name: &str, tool_name: &str) -> String {
    format!("{server_name}{TOOL_NAME_SEPARATOR}{tool_name}")
}

/// Split `"<server>__<tool>"` into its parts.
///
/// Returns `None` unless the name contains exactly one separator with
/// non-empty parts on both sides.
pub fn split_tool_name(name: &str) -> Option<(&str, &str)> {
    let mut parts = name.split(TOOL_NAME_SEPARATOR);
    let server = parts.next()?;
    let tool = parts.next()?;
    if parts.next().is_some() || server.is_empty() || tool.is_empty() {
        return None;
    }
    Some((server, tool))
}

/// `tools/list` response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ListToolsResult {
    #[serde(default)]
    pub tools: Vec<McpTool>,
    #[serde(default, rename = "nextCursor")]
    pub next_cursor: Option<String>,
}

/// `tools/call` response payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallToolResult {
    /// Raw content items (`text`, `image`, `resource`, ...).
    #[serde(default)]
    pub content: Vec<serde_json::Value>,
    #[serde(default, rename = "isError")]
    pub is_error: bool,
}

/// Result of a tool call execution.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallResult {
    pub server_name: String,
    pub tool_name: String,
    /// Raw result blocks exactly as the server returned them.
    pub content: Vec<serde_json::Value>,
    /// The server flagged the call as failed (`isError`).
    pub is_error: bool,
    pub execution_time_ms: u64,
}

impl ToolCallResult {
    /// The first `text` content item, if any.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|item| {
            if item.get("type").and_then(|t| t.as_str()) == Some("text") {
                item.get("text").and_then(|t| t.as_str())
            } else {
                None
            }
        })
    }
}

/// MCP initialize response payload.
#[derive(Debug, Clone, Deserialize)]
pub struct InitializeResult {
    #[serde(default, rename = "protocolVersion")]
    pub protocol_version: Option<String>,
    #[serde(default)]
    pub capabilities: serde_json::Value,
    #[serde(default, rename = "serverInfo", alias = "server_info")]
    pub server_info: Option<ServerInfo>,
}

/// Server info returned in the initialize response.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

// ─── Server Configuration ────────────────────────────────────────────────────

/// Transport configuration for one tool server.
///
/// Untagged: an entry carrying a `url` is an SSE server, anything else is a
/// stdio subprocess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ServerConfig {
    Sse {
        url: String,
        /// `"Key: Value"` header lines.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        headers: Vec<String>,
    },
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
    },
}

impl ServerConfig {
    /// Short transport label for logs.
    pub fn transport_name(&self) -> &'static str {
        match self {
            ServerConfig::Sse { .. } => "sse",
            ServerConfig::Stdio { .. } => "stdio",
        }
    }
}

/// A configured server plus its enabled flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerEntry {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(flatten)]
    pub config: ServerConfig,
}

fn default_enabled() -> bool {
    true
}

/// Top-level tool-server configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct McpServersConfig {
    #[serde(rename = "mcpServers", default)]
    pub servers: HashMap<String, ServerEntry>,
}

impl McpServersConfig {
    /// Configs of enabled servers only.
    pub fn enabled_servers(&self) -> HashMap<String, ServerConfig> {
        self.servers
            .iter()
            .filter(|(_, entry)| entry.enabled)
            .map(|(name, entry)| (name.clone(), entry.config.clone()))
            .collect()
    }
}

// ─── Standard MCP Error Codes ────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i32 = -32700;
    /// The method does not exist or is not available.
    pub const METHOD_NOT_FOUND: i32 = -32601;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i32 = -32603;
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_rpc_request_serialization() {
        let req = JsonRpcRequest::new(1, "initialize", None);
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"jsonrpc\":\"2.0\""));
        assert!(json.contains("\"id\":1"));
        assert!(json.contains("\"method\":\"initialize\""));
        // params should be omitted when None
        assert!(!json.contains("params"));
    }

    #[test]
    fn test_notification_has_no_id() {
        let note = JsonRpcNotification::new("notifications/initialized", None);
        let json = serde_json::to_string(&note).unwrap();
        assert!(!json.contains("\"id\""));
        assert!(json.contains("notifications/initialized"));
    }

    #[test]
    fn test_server_initiated_frames_are_not_responses() {
        assert!(JsonRpcResponse::from_frame(r#"{"jsonrpc":"2.0","id":1,"method":"ping"}"#).is_none());
        assert!(JsonRpcResponse::from_frame(r#"{"jsonrpc":"2.0","method":"notifications/progress"}"#).is_none());
        assert!(JsonRpcResponse::from_frame("server listening on stdio").is_none());

        let resp = JsonRpcResponse::from_frame(r#"{"jsonrpc":"2.0","id":1,"result":{}}"#).unwrap();
        assert_eq!(resp.id, 1);
        assert!(resp.result.is_some());
    }

    #[test]
    fn test_json_rpc_error_response() {
        let json = r#"{
            "jsonrpc": "2.0",
            "id": 2,
            "result": null,
            "error": {"code": -32601, "message": "Method not found"}
        }"#;
        let resp: JsonRpcResponse = serde_json::from_str(json).unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, error_codes::METHOD_NOT_FOUND);
    }

    #[test]
    fn test_tool_parses_camel_case_schema() {
        let json = r#"{
            "name": "list_files",
            "description": "List files",
            "inputSchema": {
                "type": "object",
                "properties": {"path": {"type": "string"}},
                "required": ["path"]
            }
        }"#;
        let tool: McpTool = serde_json::from_str(json).unwrap();
        assert_eq!(tool.input_schema.schema_type, "object");
        assert!(tool.input_schema.properties.contains_key("path"));
        assert_eq!(tool.input_schema.required, vec!["path"]);
    }

    #[test]
    fn test_tool_schema_defaults() {
        let tool: McpTool = serde_json::from_str(r#"{"name": "ping"}"#).unwrap();
        assert_eq!(tool.description, "");
        assert_eq!(tool.input_schema, ToolInputSchema::default());
    }

    #[test]
    fn test_namespacing() {
        let tool: McpTool = serde_json::from_str(r#"{"name": "list_files"}"#).unwrap();
        assert_eq!(tool.namespaced("fs").name, "fs__list_files");
        assert_eq!(split_tool_name("fs__list_files"), Some(("fs", "list_files")));
    }

    #[test]
    fn test_split_rejects_malformed_names() {
        assert_eq!(split_tool_name("list_files"), None);
        assert_eq!(split_tool_name("__list_files"), None);
        assert_eq!(split_tool_name("fs__"), None);
        assert_eq!(split_tool_name("a__b__c"), None);
    }

    #[test]
    fn test_first_text_skips_media() {
        let result = ToolCallResult {
            server_name: "fs".into(),
            tool_name: "read".into(),
            content: vec![
                serde_json::json!({"type": "image", "data": "AAAA", "mimeType": "image/png"}),
                serde_json::json!({"type": "text", "text": "first"}),
                serde_json::json!({"type": "text", "text": "second"}),
            ],
            is_error: false,
            execution_time_ms: 3,
        };
        assert_eq!(result.first_text(), Some("first"));
    }

    #[test]
    fn test_server_config_variant_from_url_presence() {
        let json = r#"{
            "mcpServers": {
                "file_server": {
                    "command": "/usr/bin/node",
                    "args": ["index.js"],
                    "env": {"DEBUG": "true"}
                },
                "api_server": {
                    "url": "https://api.example.com/mcp",
                    "headers": ["Authorization: Bearer token123"],
                    "enabled": false
                }
            }
        }"#;
        let config: McpServersConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.servers.len(), 2);

        let file = &config.servers["file_server"];
        assert!(file.enabled, "enabled defaults to true");
        match &file.config {
            ServerConfig::Stdio { command, args, env } => {
                assert_eq!(command, "/usr/bin/node");
                assert_eq!(args, &vec!["index.js".to_string()]);
                assert_eq!(env.get("DEBUG").map(String::as_str), Some("true"));
            }
            other => panic!("expected stdio, got {other:?}"),
        }

        let api = &config.servers["api_server"];
        assert!(!api.enabled);
        assert_eq!(api.config.transport_name(), "sse");

        let enabled = config.enabled_servers();
        assert_eq!(enabled.len(), 1);
        assert!(enabled.contains_key("file_server"));
    }
}
