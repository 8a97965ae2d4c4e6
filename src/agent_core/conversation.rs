//! ConversationManager — the message log with sliding-window pruning.
//!
//! Responsibilities:
//! - Append turns in causal order (user, assistant, tool, ...)
//! - Before each provider call, keep only the last `W` messages
//! - Keep `tool_use` / `tool_result` pairs consistent after truncation
//!
//! Pruning is destructive: dropped messages are gone from the log.

use std::collections::HashSet;

use crate::history::{ContentBlock, Message, Role};

// ─── Constants ──────────────────────────────────────────────────────────────

/// Messages kept when no window is configured.
pub const DEFAULT_MESSAGE_WINDOW: i64 = 10;

// ─── ConversationManager ────────────────────────────────────────────────────

/// Owns the ordered message log of one engine.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    messages: Vec<Message>,
    /// Retained message count; `<= 0` disables pruning.
    window: i64,
}

impl Default for ConversationManager {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_WINDOW)
    }
}

impl ConversationManager {
    pub fn new(window: i64) -> Self {
        Self {
            messages: Vec::new(),
            window,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// The most recently appended message.
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Apply the window to the live log. No-op when the window is disabled.
    pub fn prune(&mut self) {
        if self.window <= 0 {
            return;
        }
        let before = self.messages.len();
        let messages = std::mem::take(&mut self.messages);
        self.messages = prune_messages(messages, self.window as usize);

        if self.messages.len() != before {
            tracing::debug!(
                before,
                after = self.messages.len(),
                window = self.window,
                "pruned conversation"
            );
        }
    }
}

// ─── Pruning ────────────────────────────────────────────────────────────────

/// Keep the last `window` messages, then drop unpaired tool halves.
///
/// A `tool_use` survives only if a `tool_result` for its id is kept, and a
/// `tool_result` only if its `tool_use` is kept. Assistant messages left
/// with no content are removed; user and tool messages stay even if empty.
pub fn prune_messages(mut messages: Vec<Message>, window: usize) -> Vec<Message> {
    if messages.len() > window {
        messages.drain(..messages.len() - window);
    }

    let mut use_ids: HashSet<String> = HashSet::new();
    let mut result_ids: HashSet<String> = HashSet::new();
    for msg in &messages {
        for block in &msg.content {
            match block {
                ContentBlock::ToolUse { id, .. } => {
                    use_ids.insert(id.clone());
                }
                ContentBlock::ToolResult { tool_use_id, .. } => {
                    result_ids.insert(tool_use_id.clone());
                }
                ContentBlock::Text { .. } => {}
            }
        }
    }

    messages
        .into_iter()
        .filter_map(|mut msg| {
            msg.content.retain(|block| match block {
                ContentBlock::ToolUse { id, .. } => result_ids.contains(id),
                ContentBlock::ToolResult { tool_use_id, .. } => use_ids.contains(tool_use_id),
                ContentBlock::Text { .. } => true,
            });
            (!(msg.content.is_empty() && msg.role == Role::Assistant)).then_some(msg)
        })
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
