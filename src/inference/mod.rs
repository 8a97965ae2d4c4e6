//! Inference — one provider contract over interchangeable LLM backends.
//!
//! This module handles:
//! - Provider configuration and fail-fast validation
//! - The [`Provider`] trait the engine calls each cycle
//! - OpenAI-compatible (OpenAI, Ollama), Anthropic and Google backends
//! - Converting conversation history to each backend's wire format
//!
//! The engine never branches on which backend it talks to; switching
//! providers is a config change, not a code change.

pub mod anthropic;
pub mod config;
pub mod errors;
pub mod google;
pub mod openai;
pub mod provider;
pub mod types;

pub use config::{ProviderConfig, ProviderKind};
pub use errors::InferenceError;
pub use provider::{create_provider, Provider};
pub use types::{ProviderMessage, Tool, ToolCall};
