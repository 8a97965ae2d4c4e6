//! Host settings file loading.
//!
//! Settings are YAML. String values may reference the environment as
//! `${VAR}` or `${VAR:-default}`; defaults may start with `~`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::agent_core::conversation::DEFAULT_MESSAGE_WINDOW;
use crate::agent_core::EngineConfig;
use crate::inference::ProviderConfig;

// ─── Constants ───────────────────────────────────────────────────────────────

const APP_DIR: &str = "spotlight-host";
const SETTINGS_FILE: &str = "host.yaml";
const SERVERS_FILE: &str = "mcp_servers.json";

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },
}

// ─── Settings ────────────────────────────────────────────────────────────────

/// Contents of `host.yaml`.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSettings {
    /// Tool-server file; defaults to `mcp_servers.json` next to the settings.
    #[serde(default)]
    pub servers_file: Option<String>,
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_message_window")]
    pub message_window: i64,
    /// Per tool call limit, in seconds.
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub debug_mode: bool,
    #[serde(default)]
    pub log_json: bool,
    pub provider: ProviderConfig,
}

fn default_message_window() -> i64 {
    DEFAULT_MESSAGE_WINDOW
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl HostSettings {
    /// Where the tool-server file lives.
    pub fn servers_path(&self) -> PathBuf {
        match &self.servers_file {
            Some(path) if !path.trim().is_empty() => PathBuf::from(expand_tilde(path.trim())),
            _ => default_config_dir().join(SERVERS_FILE),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    /// Engine settings derived from this file. Timeouts and backoff keep
    /// their defaults.
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            message_window: self.message_window,
            ..EngineConfig::default()
        }
    }
}

/// `<platform config dir>/spotlight-host`.
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default settings path, `<platform config dir>/spotlight-host/host.yaml`.
pub fn default_settings_path() -> PathBuf {
    default_config_dir().join(SETTINGS_FILE)
}

// ─── Loading ─────────────────────────────────────────────────────────────────

/// Load and parse the settings file, interpolating environment variables.
pub fn load_settings(path: &Path) -> Result<HostSettings, SettingsError> {
    let raw = std::fs::read_to_string(path).map_err(|source| SettingsError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    parse_settings(&raw).map_err(|e| SettingsError::Parse {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn parse_settings(raw: &str) -> Result<HostSettings, serde_yaml::Error> {
    serde_yaml::from_str(&interpolate_env_vars(raw))
}

// ─── Env-var interpolation ───────────────────────────────────────────────────

/// Replace `${VAR}` and `${VAR:-default}` in a string.
fn interpolate_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            result.push(ch);
            continue;
        }
        chars.next();
        let expr: String = chars.by_ref().take_while(|c| *c != '}').collect();
        result.push_str(&resolve_var_expr(&expr));
    }

    result
}

/// Resolve `VAR` or `VAR:-default`. Unset without default is empty.
fn resolve_var_expr(expr: &str) -> String {
    match expr.split_once(":-") {
        Some((name, default)) => std::env::var(name).unwrap_or_else(|_| expand_tilde(default)),
        None => std::env::var(expr).unwrap_or_default(),
    }
}

/// Expand a leading `~` to the home directory.
fn expand_tilde(path: &str) -> String {
    match (path.strip_prefix('~'), dirs::home_dir()) {
        (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
        _ => path.to_string(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
