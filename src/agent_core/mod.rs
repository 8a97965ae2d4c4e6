//! Agent Core — tool orchestration for Spotlight Host.
//!
//! Submodules:
//! - `engine`: The prompt cycle loop and the caller's [`EngineHandle`]
//! - `conversation`: Message log with sliding-window pruning
//! - `tool_router`: Dispatches model tool calls to tool servers
//! - `confirmation`: Sensitivity classification and the approval handshake
//! - `retry`: Exponential backoff for overloaded providers
//! - `events`: Outbound event publishing with confirmation suppression
//! - `types`: Event bus payloads
//! - `errors`: Agent-level error types

pub mod confirmation;
pub mod conversation;
pub mod engine;
pub mod errors;
pub mod events;
pub mod retry;
pub mod tool_router;
pub mod types;

// Re-exports for convenience
pub use confirmation::{is_sensitive, ConfirmationGate};
pub use conversation::{prune_messages, ConversationManager};
pub use engine::{Engine, EngineConfig, EngineHandle};
pub use errors::AgentError;
pub use events::EventSink;
pub use retry::BackoffPolicy;
pub use tool_router::{ToolFailurePolicy, ToolRouter};
pub use types::{
    AuthorizationRequest, ConfirmationReply, ConfirmationRequest, PromptEvent, ToolResultEvent,
    ToolUseEvent,
};
