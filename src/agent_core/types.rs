//! Shared types for the agent core.
//!
//! Everything crossing the event bus: the [`PromptEvent`] envelope, its
//! payloads, and the caller's [`ConfirmationReply`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::history::Message;

// ─── Event Envelope ─────────────────────────────────────────────────────────

/// One event on the bus, serialized as `{"type": ..., "data": ...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PromptEvent {
    /// Inbound query from the caller.
    Prompt(String),
    /// A tool is about to run.
    ToolUse(ToolUseEvent),
    /// A tool finished.
    ToolResult(ToolResultEvent),
    /// A tool server rejected the client's credentials.
    AuthorizationRequired(AuthorizationRequest),
    /// A sensitive tool call is waiting for the caller's approval.
    ConfirmationRequired(ConfirmationRequest),
    /// The terminal assistant reply of a cycle.
    FinalResult(Message),
    /// A cycle-level or tool-scoped failure.
    Error(String),
}

impl PromptEvent {
    /// The wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PromptEvent::Prompt(_) => "prompt",
            PromptEvent::ToolUse(_) => "tool_use",
            PromptEvent::ToolResult(_) => "tool_result",
            PromptEvent::AuthorizationRequired(_) => "authorization_required",
            PromptEvent::ConfirmationRequired(_) => "confirmation_required",
            PromptEvent::FinalResult(_) => "final_result",
            PromptEvent::Error(_) => "error",
        }
    }
}

// ─── Payloads ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUseEvent {
    /// The originating `tool_use` block id.
    pub id: String,
    pub server: String,
    pub tool: String,
    pub args: serde_json::Map<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResultEvent {
    pub tool_use_id: String,
    pub server: String,
    pub tool: String,
    pub text: String,
    pub is_error: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    pub server: String,
    pub tool: String,
    pub reason: String,
}

/// Sent to the caller when a tool call needs approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmationRequest {
    /// Opaque id the reply must echo back.
    pub token: String,
    pub server: String,
    pub tool: String,
    /// Arguments as pretty-printed JSON, for display.
    pub args: String,
}

/// The caller's answer to a [`ConfirmationRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReply {
    pub token: String,
    pub approved: bool,
}

// ─── Tests ──────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_shape() {
        let json = serde_json::to_value(PromptEvent::Error("confirmation timeout".into())).unwrap();
        assert_eq!(json, serde_json::json!({"type": "error", "data": "confirmation timeout"}));

        let json = serde_json::to_value(PromptEvent::ConfirmationRequired(ConfirmationRequest {
            token: "t".into(),
            server: "fs".into(),
            tool: "delete_file".into(),
            args: "{}".into(),
        }))
        .unwrap();
        assert_eq!(json["type"], "confirmation_required");
        assert_eq!(json["data"]["tool"], "delete_file");
    }

    #[test]
    fn test_prompt_deserializes() {
        let event: PromptEvent =
            serde_json::from_str(r#"{"type": "prompt", "data": "List files"}"#).unwrap();
        assert_eq!(event, PromptEvent::Prompt("List files".into()));
        assert_eq!(event.kind(), "prompt");
    }
}
