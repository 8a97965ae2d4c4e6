//! Conversation history model.
//!
//! A [`Message`] is one turn; its content is an ordered list of
//! [`ContentBlock`]s. Tool calls and their results are correlated by the
//! `tool_use` block's id.

use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

/// One piece of a message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    /// An assistant's request to call `name` (`"<server>__<tool>"`).
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Map<String, serde_json::Value>,
    },
    /// The outcome of the `tool_use` with id `tool_use_id`.
    ToolResult {
        tool_use_id: String,
        /// Display text (the first textual result item).
        text: String,
        /// Every result item exactly as the server returned it.
        #[serde(default)]
        raw_content: Vec<serde_json::Value>,
        #[serde(default)]
        is_error: bool,
    },
}

/// One turn in the conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl Message {
    /// A user turn holding a single text block.
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// An assistant turn with the given blocks.
    pub fn assistant(content: Vec<ContentBlock>) -> Self {
        Self {
            role: Role::Assistant,
            content,
        }
    }

    /// A tool turn carrying one result block.
    pub fn tool_result(
        tool_use_id: impl Into<String>,
        text: impl Into<String>,
        raw_content: Vec<serde_json::Value>,
        is_error: bool,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: tool_use_id.into(),
                text: text.into(),
                raw_content,
                is_error,
            }],
        }
    }

    /// All text blocks joined with newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// `(id, name, input)` of every `tool_use` block.
    pub fn tool_uses(
        &self,
    ) -> impl Iterator<Item = (&str, &str, &serde_json::Map<String, serde_json::Value>)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some((id.as_str(), name.as_str(), input)),
            _ => None,
        })
    }

    /// `(tool_use_id, text)` of every `tool_result` block.
    pub fn tool_results(&self) -> impl Iterator<Item = (&str, &str)> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolResult {
                tool_use_id, text, ..
            } => Some((tool_use_id.as_str(), text.as_str())),
            _ => None,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
