//! ToolRouter — dispatches model tool calls to tool servers.
//!
//! For each call the router:
//! - Splits the namespaced name into server and tool
//! - Holds sensitive calls at the confirmation gate
//! - Executes the call via [`McpClient`] and appends the `tool` message
//! - Applies the [`ToolFailurePolicy`] when a call fails

use std::sync::Arc;

use chrono::Utc;

use crate::history::Message;
use crate::inference::ToolCall;
use crate::mcp_client::{split_tool_name, McpClient};

use super::confirmation::{is_sensitive, ConfirmationGate};
use super::conversation::ConversationManager;
use super::errors::AgentError;
use super::events::EventSink;
use super::types::{AuthorizationRequest, PromptEvent, ToolResultEvent, ToolUseEvent};

/// What a failed tool call does to the rest of the cycle.
///
/// Confirmation rejections and timeouts abort the cycle under either policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ToolFailurePolicy {
    /// Report the failure as an `error` event, record it as an error
    /// `tool_result` for the model, and run the remaining calls.
    #[default]
    SkipAndContinue,
    /// End the cycle at the first failing call.
    AbortCycle,
}

pub struct ToolRouter {
    mcp: Arc<McpClient>,
    policy: ToolFailurePolicy,
}

impl ToolRouter {
    pub fn new(mcp: Arc<McpClient>, policy: ToolFailurePolicy) -> Self {
        Self { mcp, policy }
    }

    /// Run one tool call.
    ///
    /// On `Ok` a `tool_result` for `call` has been appended to
    /// `conversation`, including for a skipped failure.
    pub async fn execute(
        &self,
        call: &ToolCall,
        gate: &mut ConfirmationGate,
        sink: &EventSink,
        conversation: &mut ConversationManager,
    ) -> Result<(), AgentError> {
        let Some((server, tool)) = split_tool_name(&call.name) else {
            return self
                .fail(
                    call,
                    sink,
                    conversation,
                    AgentError::InvalidToolName {
                        name: call.name.clone(),
                    },
                )
                .await;
        };

        if is_sensitive(tool, &call.arguments) {
            gate.request(sink, server, tool, &call.arguments).await?;
        }

        sink.emit(PromptEvent::ToolUse(ToolUseEvent {
            id: call.id.clone(),
            server: server.to_string(),
            tool: tool.to_string(),
            args: call.arguments.clone(),
            timestamp: Utc::now(),
        }))
        .await;

        match self.mcp.call_tool(server, tool, call.arguments.clone()).await {
            Ok(result) => {
                let text = result.first_text().unwrap_or_default().to_string();
                sink.emit(PromptEvent::ToolResult(ToolResultEvent {
                    tool_use_id: call.id.clone(),
                    server: server.to_string(),
                    tool: tool.to_string(),
                    text: text.clone(),
                    is_error: result.is_error,
                    duration_ms: result.execution_time_ms,
                    timestamp: Utc::now(),
                }))
                .await;
                conversation.push(Message::tool_result(
                    &call.id,
                    text,
                    result.content,
                    result.is_error,
                ));
                Ok(())
            }
            Err(e) => {
                if e.is_unauthorized() {
                    sink.emit(PromptEvent::AuthorizationRequired(AuthorizationRequest {
                        server: server.to_string(),
                        tool: tool.to_string(),
                        reason: e.to_string(),
                    }))
                    .await;
                }
                self.fail(
                    call,
                    sink,
                    conversation,
                    AgentError::ToolFailed {
                        tool: call.name.clone(),
                        source: e,
                    },
                )
                .await
            }
        }
    }

    /// Every `tool_use` gets a result block, so the next provider call
    /// sees the failure and the pair survives pruning.
    async fn fail(
        &self,
        call: &ToolCall,
        sink: &EventSink,
        conversation: &mut ConversationManager,
        error: AgentError,
    ) -> Result<(), AgentError> {
        match self.policy {
            ToolFailurePolicy::SkipAndContinue => {
                tracing::warn!(error = %error, "skipping failed tool call");
                let reason = error.to_string();
                sink.emit(PromptEvent::Error(reason.clone())).await;
                conversation.push(Message::tool_result(&call.id, reason, Vec::new(), true));
                Ok(())
            }
            ToolFailurePolicy::AbortCycle => Err(error),
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
