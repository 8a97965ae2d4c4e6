//! Tool-server configuration file loading.

use std::collections::HashMap;
use std::path::Path;

use super::errors::McpError;
use super::types::McpServersConfig;

/// Load the `mcpServers` file at `path`.
///
/// A missing file is not an error: it yields an empty server set.
pub fn load_servers_config(path: &Path) -> Result<McpServersConfig, McpError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "no tool-server config file, starting with no servers");
        return Ok(McpServersConfig::default());
    }

    let raw = std::fs::read_to_string(path).map_err(|e| McpError::ConfigError {
        reason: format!("failed to read {}: {e}", path.display()),
    })?;

    let config: McpServersConfig =
        serde_json::from_str(&raw).map_err(|e| McpError::ConfigError {
            reason: format!("failed to parse {}: {e}", path.display()),
        })?;

    tracing::info!(
        path = %path.display(),
        servers = config.servers.len(),
        enabled = config.enabled_servers().len(),
        "loaded tool-server config"
    );
    Ok(config)
}

/// Parse `"Key: Value"` header lines. Lines without a colon are skipped.
pub fn parse_header_lines(lines: &[String]) -> HashMap<String, String> {
    lines
        .iter()
        .filter_map(|line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

// ─── Tests ───────────────────────────────────────────────────────────────────
