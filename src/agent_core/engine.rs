//! Engine — the prompt cycle state machine.
//!
//! One background loop per engine. Each inbound prompt runs one cycle:
//!
//! ```text
//! prompt → prune → provider (with backoff) → assistant message
//!        → [confirm] → tool calls → tool messages → provider → ... → final_result
//! ```
//!
//! A failed cycle is reported as an `error` event and the loop waits for the
//! next prompt. The loop ends only on cancellation or when every
//! [`EngineHandle`] is gone.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendTimeoutError;
use tokio_util::sync::CancellationToken;

use crate::history::{ContentBlock, Message};
use crate::inference::{Provider, Tool};
use crate::mcp_client::{McpClient, McpTool};

use super::confirmation::{ConfirmationGate, DEFAULT_CONFIRMATION_TIMEOUT};
use super::conversation::{ConversationManager, DEFAULT_MESSAGE_WINDOW};
use super::errors::AgentError;
use super::events::EventSink;
use super::retry::{call_with_backoff, BackoffPolicy};
use super::tool_router::{ToolFailurePolicy, ToolRouter};
use super::types::{ConfirmationReply, PromptEvent};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Bus channels hold at most one pending item.
const CHANNEL_CAPACITY: usize = 1;

/// How long `search` waits before warning that the engine is busy.
const ENQUEUE_WARN_AFTER: Duration = Duration::from_millis(100);

// ─── Configuration ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Messages kept before each provider call; `<= 0` disables pruning.
    pub message_window: i64,
    pub backoff: BackoffPolicy,
    pub confirmation_timeout: Duration,
    pub tool_failure_policy: ToolFailurePolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            message_window: DEFAULT_MESSAGE_WINDOW,
            backoff: BackoffPolicy::default(),
            confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            tool_failure_policy: ToolFailurePolicy::default(),
        }
    }
}

// ─── EngineHandle ───────────────────────────────────────────────────────────

/// The caller's side of the bus. Cheap to clone.
#[derive(Clone)]
pub struct EngineHandle {
    prompts: mpsc::Sender<PromptEvent>,
    replies: mpsc::Sender<ConfirmationReply>,
    events: Arc<Mutex<Option<mpsc::Receiver<PromptEvent>>>>,
}

impl EngineHandle {
    /// Enqueue a query. Returns once the engine has accepted it, not when
    /// it has been answered.
    pub async fn search(&self, query: &str) -> Result<(), AgentError> {
        tracing::info!(
            query_len = query.len(),
            word_count = query.split_whitespace().count(),
            "search enqueued"
        );

        let event = PromptEvent::Prompt(query.to_string());
        match self.prompts.send_timeout(event, ENQUEUE_WARN_AFTER).await {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(event)) => {
                tracing::warn!(
                    waited_ms = ENQUEUE_WARN_AFTER.as_millis() as u64,
                    "engine busy, still waiting to enqueue prompt"
                );
                self.prompts
                    .send(event)
                    .await
                    .map_err(|_| AgentError::ChannelClosed { channel: "prompt" })
            }
            Err(SendTimeoutError::Closed(_)) => Err(AgentError::ChannelClosed { channel: "prompt" }),
        }
    }

    /// Feed queries to [`search`](Self::search), in order, from a background
    /// task. Sending on the returned channel never waits for the engine, so a
    /// caller stays free to answer confirmations while earlier queries queue.
    pub fn spawn_submitter(&self) -> mpsc::UnboundedSender<String> {
        let (tx, mut queries) = mpsc::unbounded_channel::<String>();
        let handle = self.clone();
        tokio::spawn(async move {
            while let Some(query) = queries.recv().await {
                if let Err(e) = handle.search(&query).await {
                    tracing::warn!(error = %e, "dropping queued queries");
                    break;
                }
            }
        });
        tx
    }

    /// Answer an outstanding `confirmation_required` event.
    pub async fn confirm(&self, token: &str, approved: bool) -> Result<(), AgentError> {
        self.replies
            .send(ConfirmationReply {
                token: token.to_string(),
                approved,
            })
            .await
            .map_err(|_| AgentError::ChannelClosed {
                channel: "confirmation",
            })
    }

    /// The outbound event stream. Only the first call gets it.
    pub fn events(&self) -> Option<mpsc::Receiver<PromptEvent>> {
        self.events.lock().ok().and_then(|mut slot| slot.take())
    }
}

// ─── Engine ─────────────────────────────────────────────────────────────────

pub struct Engine {
    provider: Arc<dyn Provider>,
    tools: Vec<Tool>,
    router: ToolRouter,
    gate: ConfirmationGate,
    sink: EventSink,
    prompts: mpsc::Receiver<PromptEvent>,
    conversation: ConversationManager,
    backoff: BackoffPolicy,
}

impl Engine {
    /// Build an engine over an initialized tool client.
    ///
    /// The tool list is taken from `mcp` once, here.
    pub fn new(
        provider: Arc<dyn Provider>,
        mcp: Arc<McpClient>,
        config: EngineConfig,
    ) -> (Self, EngineHandle) {
        let (prompt_tx, prompt_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (reply_tx, reply_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let (event_tx, event_rx) = mpsc::channel(CHANNEL_CAPACITY);

        let tools = mcp.all_tools().iter().map(to_provider_tool).collect();

        let engine = Self {
            provider,
            tools,
            router: ToolRouter::new(mcp, config.tool_failure_policy),
            gate: ConfirmationGate::new(reply_rx, config.confirmation_timeout),
            sink: EventSink::new(event_tx),
            prompts: prompt_rx,
            conversation: ConversationManager::new(config.message_window),
            backoff: config.backoff,
        };
        let handle = EngineHandle {
            prompts: prompt_tx,
            replies: reply_tx,
            events: Arc::new(Mutex::new(Some(event_rx))),
        };
        (engine, handle)
    }

    /// A publisher for other call paths. Obeys confirmation suppression.
    pub fn event_sink(&self) -> EventSink {
        self.sink.clone()
    }

    /// The live message log (already pruned in place).
    pub fn history(&self) -> &[Message] {
        self.conversation.messages()
    }

    /// Tools offered to the provider.
    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Serve prompts until `cancel` fires or every handle is dropped.
    ///
    /// Cancellation is checked between cycles; an in-flight cycle finishes.
    pub async fn run(&mut self, cancel: CancellationToken) {
        tracing::info!(
            provider = self.provider.name(),
            model = self.provider.model(),
            tools = self.tools.len(),
            "engine started"
        );

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("engine cancelled");
                    break;
                }
                event = self.prompts.recv() => match event {
                    Some(event) => event,
                    None => {
                        tracing::info!("prompt channel closed, engine stopping");
                        break;
                    }
                },
            };

            let PromptEvent::Prompt(prompt) = event else {
                tracing::warn!(kind = event.kind(), "ignoring non-prompt inbound event");
                continue;
            };

            if let Err(e) = self.run_cycle(prompt).await {
                tracing::warn!(error = %e, "prompt cycle failed");
                self.sink.emit(PromptEvent::Error(e.to_string())).await;
            }
        }
    }

    /// One prompt, start to `final_result`.
    async fn run_cycle(&mut self, prompt: String) -> Result<(), AgentError> {
        self.conversation.push(Message::user(prompt.clone()));
        let mut latest = prompt;

        loop {
            self.conversation.prune();

            let reply = {
                let provider = &self.provider;
                let history = self.conversation.messages();
                let tools = self.tools.as_slice();
                let latest = latest.as_str();
                call_with_backoff(&self.backoff, move || {
                    provider.create_message(latest, history, tools)
                })
                .await?
            };

            tracing::debug!(
                text_len = reply.text.len(),
                tool_calls = reply.tool_calls.len(),
                "provider replied"
            );
            self.conversation.push(assistant_message(&reply.text, &reply.tool_calls));
            if reply.tool_calls.is_empty() {
                break;
            }

            for call in &reply.tool_calls {
                self.router
                    .execute(call, &mut self.gate, &self.sink, &mut self.conversation)
                    .await?;
            }
            latest.clear();
        }

        if let Some(last) = self.conversation.last().cloned() {
            self.sink.emit(PromptEvent::FinalResult(last)).await;
        }
        Ok(())
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────────

fn to_provider_tool(tool: &McpTool) -> Tool {
    Tool {
        name: tool.name.clone(),
        description: tool.description.clone(),
        input_schema: serde_json::to_value(&tool.input_schema).unwrap_or_default(),
    }
}

/// Text block (if any) followed by one `tool_use` per call.
fn assistant_message(text: &str, calls: &[crate::inference::ToolCall]) -> Message {
    let mut blocks = Vec::with_capacity(calls.len() + 1);
    if !text.is_empty() {
        blocks.push(ContentBlock::Text {
            text: text.to_string(),
        });
    }
    blocks.extend(calls.iter().map(|call| ContentBlock::ToolUse {
        id: call.id.clone(),
        name: call.name.clone(),
        input: call.arguments.clone(),
    }));
    Message::assistant(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;
    use crate::inference::ToolCall;

    #[test]
    fn test_assistant_message_orders_text_before_tool_uses() {
        let calls = vec![ToolCall {
            id: "call_1".into(),
            name: "fs__list_files".into(),
            arguments: serde_json::Map::new(),
        }];
        let msg = assistant_message("Looking.", &calls);
        assert_eq!(msg.role, Role::Assistant);
        assert_eq!(msg.content.len(), 2);
        assert!(matches!(msg.content[0], ContentBlock::Text { .. }));

        let msg = assistant_message("", &calls);
        assert_eq!(msg.content.len(), 1);
    }

    #[test]
    fn test_provider_tool_carries_schema() {
        let tool: McpTool = serde_json::from_value(serde_json::json!({
            "name": "fs__read_file",
            "description": "Read a file",
            "inputSchema": {"type": "object", "properties": {"path": {"type": "string"}}, "required": ["path"]}
        }))
        .unwrap();
        let tool = to_provider_tool(&tool);
        assert_eq!(tool.input_schema["required"][0], "path");
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_events_taken_once() {
        let (tx, rx) = mpsc::channel(1);
        let (reply_tx, _reply_rx) = mpsc::channel(1);
        let handle = EngineHandle {
            prompts: tx,
            replies: reply_tx,
            events: Arc::new(Mutex::new(Some(rx))),
        };
        assert!(handle.clone().events().is_some());
        assert!(handle.events().is_none());
    }
}
