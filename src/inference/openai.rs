//! OpenAI-compatible chat completions backend (OpenAI, Ollama).
//!
//! Speaks `POST {base_url}/chat/completions`. With `stream: "true"` in the
//! provider metadata the response is read as SSE and tool call fragments are
//! accumulated across deltas into one message.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;

use crate::history::{ContentBlock, Message, Role};
use crate::sse::decode_events;

use super::config::{ProviderConfig, ProviderKind};
use super::errors::InferenceError;
use super::provider::{check_status, mint_call_id, needs_latest_prompt, parse_arguments, send_error, Provider};
use super::types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, ChatRole,
    FunctionCallResponse, ProviderMessage, Tool, ToolCall, ToolCallResponse, ToolDefinition,
};

// ─── OpenAiProvider ──────────────────────────────────────────────────────────

pub struct OpenAiProvider {
    kind: ProviderKind,
    config: ProviderConfig,
    system_prompt: String,
    http: HttpClient,
}

impl OpenAiProvider {
    pub fn new(
        kind: ProviderKind,
        config: ProviderConfig,
        system_prompt: &str,
        http: HttpClient,
    ) -> Self {
        Self {
            kind,
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
    ) -> ChatCompletionRequest {
        let tools: Vec<ToolDefinition> = tools.iter().map(ToolDefinition::from).collect();
        let has_tools = !tools.is_empty();
        ChatCompletionRequest {
            model: self.config.model_name.clone(),
            messages: to_chat_messages(&self.system_prompt, latest_prompt, history),
            tools: has_tools.then_some(tools),
            tool_choice: has_tools.then(|| "auto".to_string()),
            temperature: self.config.temperature(),
            max_tokens: self.config.max_tokens(),
            stream: self.config.stream(),
        }
    }
}

#[async_trait]
impl Provider for OpenAiProvider {
    fn name(&self) -> &str {
        match self.kind {
            ProviderKind::Ollama => "ollama",
            _ => "openai",
        }
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
        let url = format!("{}/chat/completions", self.config.base_url());
        let body = self.build_request(latest_prompt, history, tools);

        tracing::info!(
            provider = self.name(),
            model = %body.model,
            message_count = body.messages.len(),
            tool_count = body.tools.as_ref().map(Vec::len).unwrap_or(0),
            stream = body.stream,
            "provider request"
        );

        let mut request = self.http.post(&url).bearer_auth(&self.config.api_key).json(&body);
        if body.stream {
            request = request.header("Accept", "text/event-stream");
        }
        let response = request.send().await.map_err(|e| send_error(&url, e))?;
        let response = check_status(response).await?;

        if body.stream {
            read_stream(response).await
        } else {
            let text = response.text().await.map_err(|e| InferenceError::StreamError {
                reason: format!("failed to read response body: {e}"),
            })?;
            parse_response(&text)
        }
    }
}

// ─── Request Conversion ──────────────────────────────────────────────────────

/// Convert the history into chat completions messages.
///
/// Tool results become `tool` role messages keyed by `tool_call_id`;
/// messages with no content are skipped.
fn to_chat_messages(system_prompt: &str, latest_prompt: &str, history: &[Message]) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(history.len() + 2);
    if !system_prompt.trim().is_empty() {
        out.push(text_message(ChatRole::System, system_prompt));
    }

    for msg in history.iter().filter(|m| !m.is_empty()) {
        match msg.role {
            Role::User => out.push(text_message(ChatRole::User, &msg.text())),
            Role::Assistant => {
                let calls: Vec<ToolCallResponse> = msg
                    .tool_uses()
                    .map(|(id, name, input)| ToolCallResponse {
                        id: id.to_string(),
                        r#type: "function".to_string(),
                        function: FunctionCallResponse {
                            name: name.to_string(),
                            arguments: serde_json::Value::Object(input.clone()).to_string(),
                        },
                    })
                    .collect();
                let text = msg.text();
                out.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: (!text.is_empty()).then_some(text),
                    tool_call_id: None,
                    tool_calls: (!calls.is_empty()).then_some(calls),
                });
            }
            Role::Tool => {
                for block in &msg.content {
                    match block {
                        ContentBlock::ToolResult {
                            tool_use_id, text, ..
                        } => out.push(ChatMessage {
                            role: ChatRole::Tool,
                            content: Some(text.clone()),
                            tool_call_id: Some(tool_use_id.clone()),
                            tool_calls: None,
                        }),
                        ContentBlock::Text { text } => out.push(text_message(ChatRole::User, text)),
                        ContentBlock::ToolUse { .. } => {}
                    }
                }
            }
        }
    }

    if needs_latest_prompt(latest_prompt, history) {
        out.push(text_message(ChatRole::User, latest_prompt));
    }
    out
}

fn text_message(role: ChatRole, text: &str) -> ChatMessage {
    ChatMessage {
        role,
        content: Some(text.to_string()),
        tool_call_id: None,
        tool_calls: None,
    }
}

// ─── Response Parsing ────────────────────────────────────────────────────────

/// Parse a non-streaming response body.
fn parse_response(body: &str) -> Result<ProviderMessage, InferenceError> {
    let response: ChatCompletionResponse =
        serde_json::from_str(body).map_err(|e| InferenceError::InvalidResponse {
            reason: format!("failed to parse chat completion: {e}"),
        })?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::InvalidResponse {
            reason: "response has no choices".into(),
        })?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            Ok(ToolCall {
                id: if tc.id.is_empty() { mint_call_id() } else { tc.id },
                name: tc.function.name,
                arguments: parse_arguments(&tc.function.arguments)?,
            })
        })
        .collect::<Result<Vec<_>, InferenceError>>()?;

    Ok(ProviderMessage {
        text: choice.message.content.unwrap_or_default(),
        tool_calls,
    })
}

/// Read an SSE response to completion.
async fn read_stream(response: reqwest::Response) -> Result<ProviderMessage, InferenceError> {
    let mut events = Box::pin(decode_events(response.bytes_stream()));
    let mut state = StreamState::default();

    while let Some(event) = events.next().await {
        let event = event.map_err(|e| InferenceError::StreamError {
            reason: e.to_string(),
        })?;
        let data = event.data.trim();
        if data == "[DONE]" {
            break;
        }
        if data.is_empty() {
            continue;
        }
        let chunk: ChatCompletionChunk =
            serde_json::from_str(data).map_err(|e| InferenceError::StreamError {
                reason: format!("failed to parse SSE chunk: {e} (data: {data})"),
            })?;
        state.process_chunk(chunk);
    }

    state.finish()
}

// ─── Stream State ────────────────────────────────────────────────────────────

/// Text and tool call fragments accumulated across SSE deltas.
#[derive(Default)]
struct StreamState {
    text: String,
    /// In-progress tool calls: `(index, id, name, arguments_buffer)`.
    pending_tool_calls: Vec<(u32, Option<String>, String, String)>,
}

impl StreamState {
    fn process_chunk(&mut self, chunk: ChatCompletionChunk) {
        let Some(choice) = chunk.choices.into_iter().next() else {
            return;
        };

        if let Some(content) = choice.delta.content {
            self.text.push_str(&content);
        }

        for tc in choice.delta.tool_calls.unwrap_or_default() {
            let index = tc.index.unwrap_or(0);
            let (name_part, args_part) = tc
                .function
                .map(|f| (f.name.unwrap_or_default(), f.arguments.unwrap_or_default()))
                .unwrap_or_default();

            match self
                .pending_tool_calls
                .iter_mut()
                .find(|(idx, _, _, _)| *idx == index)
            {
                Some((_, id, name, args)) => {
                    name.push_str(&name_part);
                    args.push_str(&args_part);
                    if tc.id.is_some() {
                        *id = tc.id;
                    }
                }
                None => self.pending_tool_calls.push((index, tc.id, name_part, args_part)),
            }
        }
    }

    fn finish(mut self) -> Result<ProviderMessage, InferenceError> {
        self.pending_tool_calls.sort_by_key(|(idx, _, _, _)| *idx);
        let tool_calls = self
            .pending_tool_calls
            .into_iter()
            .map(|(_, id, name, args)| {
                Ok(ToolCall {
                    id: id.filter(|s| !s.is_empty()).unwrap_or_else(mint_call_id),
                    name,
                    arguments: parse_arguments(&args)?,
                })
            })
            .collect::<Result<Vec<_>, InferenceError>>()?;

        Ok(ProviderMessage {
            text: self.text,
            tool_calls,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
