//! Spotlight Host — answers natural-language queries with an LLM that can
//! call tools on MCP servers.
//!
//! Layers:
//! - `mcp_client`: tool-server connections (stdio and SSE)
//! - `inference`: the provider contract and its backends
//! - `agent_core`: the prompt cycle engine and its event bus
//! - `history`: the conversation message model shared by both
//! - `config`: host settings

pub mod agent_core;
pub mod config;
pub mod history;
pub mod inference;
pub mod mcp_client;
pub mod sse;

pub use agent_core::{Engine, EngineConfig, EngineHandle, PromptEvent};
pub use history::{ContentBlock, Message, Role};

/// Initialize the tracing subscriber on stderr.
///
/// `RUST_LOG` wins when set. Otherwise `debug` selects debug-level logs for
/// this crate. `json` switches to one JSON object per line.
pub fn init_tracing(debug: bool, json: bool) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let default_directive = if debug {
        "spotlight_host=debug,info"
    } else {
        "spotlight_host=info,warn"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let builder = fmt::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    // A second init (tests, embedding) is not an error.
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    if result.is_ok() {
        tracing::info!(
            version = env!("CARGO_PKG_VERSION"),
            pid = std::process::id(),
            "spotlight-host starting"
        );
    }
}
