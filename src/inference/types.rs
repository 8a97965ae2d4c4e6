//! Shared types for the inference layer.
//!
//! [`Tool`], [`ToolCall`] and [`ProviderMessage`] are what every backend
//! speaks. The rest mirror the OpenAI Chat Completions API, used by the
//! OpenAI-compatible backend for request building and response parsing.

use serde::{Deserialize, Serialize};

// ─── Provider-facing Types ───────────────────────────────────────────────────

/// A tool the model may call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    /// Namespaced name, `"<server>__<tool>"`.
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub input_schema: serde_json::Value,
}

/// A tool call requested by the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Provider-supplied id, or a minted `call_<uuid>`.
    pub id: String,
    /// Namespaced tool name.
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

/// The assistant's reply to one provider call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProviderMessage {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
}

// ─── Chat Completions Request Types ──────────────────────────────────────────

/// A single message in a chat completions request.
///
/// `content` is serialized as `""` rather than `null` for assistant messages
/// that only carry tool calls; several OpenAI-compatible runtimes reject
/// `null` content.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    #[serde(serialize_with = "serialize_content")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

fn serialize_content<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(value.as_deref().unwrap_or(""))
}

/// Chat completions message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

/// Tool definition sent in the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub r#type: String,
    pub function: FunctionDefinition,
}

/// Function definition within a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl From<&Tool> for ToolDefinition {
    fn from(tool: &Tool) -> Self {
        Self {
            r#type: "function".to_string(),
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.input_schema.clone(),
            },
        }
    }
}

/// Request body for `POST {base_url}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    pub stream: bool,
}

// ─── Chat Completions Response Types ─────────────────────────────────────────

/// Tool call as it appears in requests and non-streaming responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_tool_type")]
    pub r#type: String,
    pub function: FunctionCallResponse,
}

fn default_tool_type() -> String {
    "function".to_string()
}

/// Function call details. `arguments` is a JSON-encoded object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionCallResponse {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

/// Non-streaming response body.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ResponseChoice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseChoice {
    pub message: ResponseMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCallResponse>>,
}

/// Raw SSE chunk from a streaming response.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionChunk {
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
}

/// A single choice within a streaming chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkChoice {
    pub delta: ChunkDelta,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

/// The incremental update within a chunk choice.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkDelta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ChunkToolCall>>,
}

/// A tool call fragment within a streaming delta.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkToolCall {
    pub index: Option<u32>,
    pub id: Option<String>,
    pub function: Option<ChunkFunction>,
}

/// A function call fragment within a streaming tool call.
#[derive(Debug, Clone, Deserialize)]
pub struct ChunkFunction {
    pub name: Option<String>,
    pub arguments: Option<String>,
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_content_serialized_as_empty_string() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: None,
            tool_call_id: None,
            tool_calls: Some(vec![]),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["content"], "");
        assert!(json.get("tool_call_id").is_none());
    }

    #[test]
    fn test_optional_sampling_fields_omitted() {
        let req = ChatCompletionRequest {
            model: "m".into(),
            messages: vec![],
            tools: None,
            tool_choice: None,
            temperature: None,
            max_tokens: None,
            stream: false,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("temperature"));
        assert!(!json.contains("max_tokens"));
        assert!(!json.contains("tools"));
    }

    #[test]
    fn test_tool_definition_from_tool() {
        let tool = Tool {
            name: "fs__read".into(),
            description: "Read a file".into(),
            input_schema: serde_json::json!({"type": "object"}),
        };
        let def = ToolDefinition::from(&tool);
        assert_eq!(def.r#type, "function");
        assert_eq!(def.function.name, "fs__read");
    }
}
