//! The provider contract and backend construction.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use uuid::Uuid;

use crate::history::{Message, Role};

use super::anthropic::AnthropicProvider;
use super::config::{ProviderConfig, ProviderKind};
use super::errors::InferenceError;
use super::google::GoogleProvider;
use super::openai::OpenAiProvider;
use super::types::{ProviderMessage, Tool};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Total request timeout. Streaming bodies count toward it too.
pub(crate) const REQUEST_TIMEOUT: Duration = Duration::from_secs(180);

// ─── Provider ────────────────────────────────────────────────────────────────

/// A chat backend that can answer with text and/or tool calls.
///
/// `history` already ends with the latest user turn when the engine calls
/// this; `latest_prompt` is only appended if it is not.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Model identifier for logs.
    fn model(&self) -> &str;

    async fn create_message(
        &self,
        latest_prompt: &str,
        history: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderMessage, InferenceError>;
}

/// Build the backend named by `config`. Fails fast on missing fields.
pub fn create_provider(
    config: &ProviderConfig,
    system_prompt: &str,
) -> Result<Arc<dyn Provider>, InferenceError> {
    let kind = config.validate()?;
    let http = build_http_client(config.base_url())?;

    tracing::info!(provider = %kind, model = %config.model_name, "creating provider");

    let provider: Arc<dyn Provider> = match kind {
        ProviderKind::OpenAi | ProviderKind::Ollama => Arc::new(OpenAiProvider::new(
            kind,
            config.clone(),
            system_prompt,
            http,
        )),
        ProviderKind::Anthropic => {
            Arc::new(AnthropicProvider::new(config.clone(), system_prompt, http))
        }
        ProviderKind::Google => Arc::new(GoogleProvider::new(config.clone(), system_prompt, http)),
    };
    Ok(provider)
}

fn build_http_client(endpoint: &str) -> Result<HttpClient, InferenceError> {
    HttpClient::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| InferenceError::ConnectionFailed {
            endpoint: endpoint.to_string(),
            reason: format!("failed to build HTTP client: {e}"),
        })
}

// ─── Shared Helpers ──────────────────────────────────────────────────────────

/// Whether `latest_prompt` still needs to be sent as a trailing user turn.
pub(crate) fn needs_latest_prompt(latest_prompt: &str, history: &[Message]) -> bool {
    if latest_prompt.trim().is_empty() {
        return false;
    }
    !matches!(
        history.iter().rev().find(|m| !m.is_empty()),
        Some(last) if last.role == Role::User && last.text() == latest_prompt
    )
}

/// Fresh tool-call id for providers that do not supply one.
pub(crate) fn mint_call_id() -> String {
    format!("call_{}", Uuid::new_v4())
}

/// Decode a JSON-encoded argument object. Empty input is an empty object.
pub(crate) fn parse_arguments(
    raw: &str,
) -> Result<serde_json::Map<String, serde_json::Value>, InferenceError> {
    if raw.trim().is_empty() {
        return Ok(serde_json::Map::new());
    }
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Ok(map),
        Ok(serde_json::Value::Null) => Ok(serde_json::Map::new()),
        Ok(other) => Err(InferenceError::InvalidResponse {
            reason: format!("tool arguments are not an object: {other}"),
        }),
        Err(e) => Err(InferenceError::InvalidResponse {
            reason: format!("tool arguments are not valid JSON: {e}"),
        }),
    }
}

/// Object arguments from a JSON value (`null` and non-objects become empty).
pub(crate) fn arguments_from_value(
    value: serde_json::Value,
) -> serde_json::Map<String, serde_json::Value> {
    match value {
        serde_json::Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

/// Map a `reqwest` send failure to an inference error.
pub(crate) fn send_error(url: &str, e: reqwest::Error) -> InferenceError {
    if e.is_timeout() {
        InferenceError::Timeout {
            duration_secs: REQUEST_TIMEOUT.as_secs(),
        }
    } else {
        InferenceError::ConnectionFailed {
            endpoint: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Turn a non-2xx response into an [`InferenceError::HttpError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, InferenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    tracing::warn!(status = status.as_u16(), body = %body, "provider returned an error");
    Err(InferenceError::HttpError {
        status: status.as_u16(),
        body,
    })
}

// ─── Tests ───────────────────────────────────────────────────────────────────
