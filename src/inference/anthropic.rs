//! Anthropic Messages API backend.
//!
//! - `x-api-key` header authentication and `anthropic-version`
//! - System prompt as the top-level `system` field
//! - Native `tool_use` / `tool_result` content blocks, with tool results sent
//!   back in a `user` turn

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};

use crate::history::{ContentBlock, Message, Role};

use super::config::ProviderConfig;
use super::errors::InferenceError;
use super::provider::{arguments_from_value, check_status, mint_call_id, needs_latest_prompt, send_error, Provider};
use super::types::{ProviderMessage, Tool, ToolCall};

const DEFAULT_ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

pub struct AnthropicProvider {
    config: ProviderConfig,
    system_prompt: String,
    http: HttpClient,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, system_prompt: &str, http: HttpClient) -> Self {
        Self {
            config,
            system_prompt: system_prompt.to_string(),
            http,
        }
    }

    fn build_request(
        &self,
        latest_prompt: &str,
        history: &[Message],
        tools: &[Tool],
    ) -> AnthropicRequest {
        AnthropicRequest {
            model: self.config.model_name.clone(),
            max_tokens: self.config.max_tokens().unwrap_or(DEFAULT_MAX_TOKENS),
            system: (!self.system_prompt.trim().is_empty()).then(|| self.system_prompt.clone()),
            messages: to_api_messages(latest_prompt, history),
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.input_schema.clone(),
                })
                .collect(),
            temperature: self.config.temperature(),
        }
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn model(&self) -> &str {
        &self.config.model_name
    }

    async fn create_message(
        &self,
        latest_prompt: &str,
        history: &[Message],
        tools: &[Tool],
    ) -> Result<ProviderMessage, InferenceError> {
        let url = format!("{}/v1/messages", self.config.base_url());
        let body = self.build_request(latest_prompt, history, tools);
        let version = self
            .config
            .metadata_value("anthropic_version")
            .unwrap_or(DEFAULT_ANTHROPIC_VERSION);

        tracing::info!(
            provider = "anthropic",
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.len(),
            "provider request"
        );

        let response = self
            .http
            .post(&url)
            .header("x-api-key", &self.config.api_key)
            .header("anthropic-version", version)
            .json(&body)
            .send()
            .await
            .map_err(|e| send_error(&url, e))?;
        let response = check_status(response).await?;

        let api_resp: AnthropicResponse =
            response.json().await.map_err(|e| InferenceError::InvalidResponse {
                reason: format!("failed to parse Anthropic response: {e}"),
            })?;

        Ok(into_provider_message(api_resp))
    }
}

// ─── Conversion ──────────────────────────────────────────────────────────────

fn to_api_messages(latest_prompt: &str, history: &[Message]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::with_capacity(history.len() + 1);
    let mut previous_was_tool = false;

    for msg in history.iter().filter(|m| !m.is_empty()) {
        let role = match msg.role {
            Role::Assistant => "assistant",
            Role::User | Role::Tool => "user",
        };
        let blocks: Vec<ApiBlock> = msg
            .content
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => ApiBlock::Text { text: text.clone() },
                ContentBlock::ToolUse { id, name, input } => ApiBlock::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input: serde_json::Value::Object(input.clone()),
                },
                ContentBlock::ToolResult {
                    tool_use_id,
                    text,
                    is_error,
                    ..
                } => ApiBlock::ToolResult {
                    tool_use_id: tool_use_id.clone(),
                    content: text.clone(),
                    is_error: *is_error,
                },
            })
            .collect();

        // The API wants alternating roles; consecutive tool turns merge into
        // one user turn.
        let merge = msg.role == Role::Tool && previous_was_tool;
        previous_was_tool = msg.role == Role::Tool;
        if merge {
            if let Some(last) = out.last_mut() {
                last.content.extend(blocks);
                continue;
            }
        }
        out.push(AnthropicMessage {
            role,
            content: blocks,
        });
    }

    if needs_latest_prompt(latest_prompt, history) {
        out.push(AnthropicMessage {
            role: "user",
            content: vec![ApiBlock::Text {
                text: latest_prompt.to_string(),
            }],
        });
    }
    out
}

fn into_provider_message(resp: AnthropicResponse) -> ProviderMessage {
    let mut text = String::new();
    let mut tool_calls = Vec::new();

    for block in resp.content {
        match block {
            ResponseBlock::Text { text: t } => {
                if !text.is_empty() {
                    text.push('\n');
                }
                text.push_str(&t);
            }
            ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: if id.is_empty() { mint_call_id() } else { id },
                name,
                arguments: arguments_from_value(input),
            }),
            ResponseBlock::Other => {}
        }
    }

    ProviderMessage { text, tool_calls }
}

// ─── Anthropic API Types ─────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ApiBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ApiBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<ResponseBlock>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Other,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
