//! Google Gemini `generateContent` backend (API key authentication).

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::history::{ContentBlock, Message, Role};

use super::config::ProviderConfig;
use super::errors::InferenceError;
use super::provider::{arguments_from_value, check_status, mint_call_id, needs_latest_prompt, send_error, Provider};
use super::types::{ProviderMessage, Tool, ToolCall};

pub struct GoogleProvider {
    config: ProviderConfig,
    system_prompt: String,
    http: HttpClient,
}

impl GoogleProvider {
    pub fn new(config: ProviderConfig, system_prompt: &str, http: HttpClient) -> Self {
        Self {
            config,
            system_prompt: system_prompt.to_string(),
            http,
        }
    }

    fn build_url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.base_url(),
            self.config.model_name
        )
    }

    fn build_request(&self, latest_prompt: &str, history: &[Message], tools: &[Tool]) -> Value {
        let mut request = json!({
            "contents": convert_messages(latest_prompt, history),
        });

        let mut generation = serde_json::Map::new();
        if let Some(t) = self.config.temperature() {
            generation.insert("temperature".into(), json!(t));
        }
        if let Some(m) = self.config.max_tokens() {
            generation.insert("maxOutputTokens".into(), json!(m));
        }
        if !generation.is_empty() {
            request["generationConfig"] = Value::Object(generation);
        }

        if !self.system_prompt.trim().is_empty() {
            request["systemInstruction"] = json!({
                "parts": [{"text": self.system_prompt}]
            });
        }

        if !tools.is_empty() {
            let declarations: Vec<Value> = tools
                .iter()
                .map(|t| {
                    json!({
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.input_schema,
                    })
                })
                .collect();
            request["tools"] = json!([{ "functionDeclarations": declarations }]);
        }

        request
    }
}

#[async_trait]
impl Provider for GoogleProvider {
    fn name(&self) -> &str {
        "google"
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
        let url = self.build_url();
        let request = self.build_request(latest_prompt, history, tools);

        tracing::info!(
            provider = "google",
            model = %self.config.model_name,
            message_count = request["contents"].as_array().map(Vec::len).unwrap_or(0),
            tool_count = tools.len(),
            "provider request"
        );

        let response = self
            .http
            .post(&url)
            .query(&[("key", self.config.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| send_error(&url, e.without_url()))?;
        let response = check_status(response).await?;

        let body: GeminiResponse =
            response.json().await.map_err(|e| InferenceError::InvalidResponse {
                reason: format!("failed to parse Gemini response: {e}"),
            })?;
        parse_response(body)
    }
}

// ─── Conversion ──────────────────────────────────────────────────────────────

/// Gemini has no call ids; a `functionResponse` is matched by function name,
/// so results are labelled with the name of the `tool_use` they answer.
fn convert_messages(latest_prompt: &str, history: &[Message]) -> Vec<Value> {
    let names: HashMap<&str, &str> = history
        .iter()
        .flat_map(|m| m.tool_uses().map(|(id, name, _)| (id, name)))
        .collect();

    let mut contents: Vec<Value> = history
        .iter()
        .filter(|m| !m.is_empty())
        .map(|m| {
            let role = match m.role {
                Role::User => "user",
                Role::Assistant => "model",
                Role::Tool => "function",
            };
            let parts: Vec<Value> = m
                .content
                .iter()
                .map(|block| match block {
                    ContentBlock::Text { text } => json!({ "text": text }),
                    ContentBlock::ToolUse { name, input, .. } => json!({
                        "functionCall": { "name": name, "args": input }
                    }),
                    ContentBlock::ToolResult {
                        tool_use_id, text, ..
                    } => json!({
                        "functionResponse": {
                            "name": names.get(tool_use_id.as_str()).copied().unwrap_or("unknown"),
                            "response": { "result": text },
                        }
                    }),
                })
                .collect();
            json!({ "role": role, "parts": parts })
        })
        .collect();

    if needs_latest_prompt(latest_prompt, history) {
        contents.push(json!({ "role": "user", "parts": [{ "text": latest_prompt }] }));
    }
    contents
}

fn parse_response(response: GeminiResponse) -> Result<ProviderMessage, InferenceError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| InferenceError::InvalidResponse {
            reason: "no candidates in response".into(),
        })?;

    let mut message = ProviderMessage::default();
    for part in candidate.content.parts {
        if let Some(text) = part.text {
            message.text.push_str(&text);
        }
        if let Some(fc) = part.function_call {
            message.tool_calls.push(ToolCall {
                id: mint_call_id(),
                name: fc.name,
                arguments: arguments_from_value(fc.args),
            });
        }
    }
    Ok(message)
}

// ─── Gemini API Types ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: CandidateContent,
}

#[derive(Debug, Default, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    function_call: Option<FunctionCall>,
}

#[derive(Debug, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: Value,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_function_response_uses_call_name() {
        let history = vec![
            Message::user("read it"),
            Message::assistant(vec![ContentBlock::ToolUse {
                id: "call_x".into(),
                name: "fs__read".into(),
                input: serde_json::Map::new(),
            }]),
            Message::tool_result("call_x", "contents", vec![], false),
        ];
        let contents = convert_messages("", &history);
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "fs__read");
    }

    #[test]
    fn test_parse_function_call() {
        let body: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"text":"ok"},
                {"functionCall":{"name":"fs__list_files","args":{"path":"."}}}
            ]}}]}"#,
        )
        .unwrap();
        let msg = parse_response(body).unwrap();
        assert_eq!(msg.text, "ok");
        assert_eq!(msg.tool_calls[0].name, "fs__list_files");
        assert!(msg.tool_calls[0].id.starts_with("call_"));
    }

    #[test]
    fn test_no_candidates_is_error() {
        let body: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(parse_response(body).is_err());
    }
}
