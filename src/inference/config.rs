//! Provider configuration and validation.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::InferenceError;

// ─── Public Types ────────────────────────────────────────────────────────────

/// Which backend API a provider speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// OpenAI Chat Completions.
    OpenAi,
    /// Ollama's OpenAI-compatible endpoint.
    Ollama,
    /// Anthropic Messages API.
    Anthropic,
    /// Google Gemini `generateContent`.
    Google,
}

impl FromStr for ProviderKind {
    type Err = InferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(ProviderKind::OpenAi),
            "ollama" => Ok(ProviderKind::Ollama),
            "anthropic" => Ok(ProviderKind::Anthropic),
            "google" | "gemini" => Ok(ProviderKind::Google),
            other => Err(InferenceError::ConfigError {
                reason: format!("unsupported provider: '{other}'"),
            }),
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Ollama => "ollama",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Google => "google",
        };
        f.write_str(name)
    }
}

/// Connection settings for one LLM provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub provider_name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub model_name: String,
    /// Backend-specific extras (`max_tokens`, `temperature`, `stream`,
    /// `anthropic_version`).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ProviderConfig {
    /// Check that every required field is present and the provider is known.
    pub fn validate(&self) -> Result<ProviderKind, InferenceError> {
        let required = [
            ("provider_name", &self.provider_name),
            ("base_url", &self.base_url),
            ("api_key", &self.api_key),
            ("model_name", &self.model_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(InferenceError::ConfigError {
                    reason: format!("provider {field} is required"),
                });
            }
        }
        self.provider_name.parse()
    }

    /// `base_url` without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }

    /// `max_tokens` from metadata, if set and numeric.
    pub fn max_tokens(&self) -> Option<u32> {
        self.parsed("max_tokens")
    }

    /// `temperature` from metadata, if set and numeric.
    pub fn temperature(&self) -> Option<f32> {
        self.parsed("temperature")
    }

    /// Whether metadata asks for a streaming response.
    pub fn stream(&self) -> bool {
        self.metadata
            .get("stream")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    fn parsed<T: FromStr>(&self, key: &str) -> Option<T> {
        let raw = self.metadata.get(key)?;
        match raw.trim().parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(key, value = %raw, "ignoring non-numeric provider metadata");
                None
            }
        }
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
