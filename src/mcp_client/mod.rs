//! MCP Client — JSON-RPC tool servers over stdio or HTTP + SSE.
//!
//! This module handles:
//! - Spawning stdio server processes and opening SSE connections
//! - The `initialize` handshake and paginated tool discovery
//! - Namespacing tools as `"<server>__<tool>"`
//! - Tool call dispatch with timing
//! - Graceful shutdown of every connection

pub mod client;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod sse_transport;
pub mod transport;
pub mod types;

pub use client::{McpClient, ToolServer};
pub use config::load_servers_config;
pub use errors::McpError;
pub use types::{
    split_tool_name, CallToolResult, McpServersConfig, McpTool, ServerConfig, ToolCallResult,
    ToolInputSchema,
};
