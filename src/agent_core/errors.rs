//! Agent Core error types.
//!
//! A cycle that fails reports its error to the caller as an `error` event
//! carrying the `Display` text.

use thiserror::Error;

use crate::inference::InferenceError;
use crate::mcp_client::McpError;

/// Errors that end (or are scoped to part of) a prompt cycle.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The provider stayed overloaded through every retry.
    #[error("provider overloaded after {retries} retries: {source}")]
    ProviderOverloaded {
        retries: u32,
        #[source]
        source: InferenceError,
    },

    /// Any other provider failure. Not retried.
    #[error("provider error: {0}")]
    Provider(#[from] InferenceError),

    /// The caller rejected a sensitive tool call.
    #[error("operation aborted by user")]
    Rejected { tool: String },

    /// No confirmation reply arrived in time.
    #[error("confirmation timeout")]
    ConfirmationTimeout { tool: String, timeout_secs: u64 },

    /// Tool name is not of the form `<server>__<tool>`.
    #[error("invalid tool name format: '{name}'")]
    InvalidToolName { name: String },

    /// A tool call failed.
    #[error("tool '{tool}' failed: {source}")]
    ToolFailed {
        tool: String,
        #[source]
        source: McpError,
    },

    /// A bus channel closed underneath the engine.
    #[error("{channel} channel closed")]
    ChannelClosed { channel: &'static str },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caller_facing_messages() {
        assert_eq!(
            AgentError::Rejected {
                tool: "delete_file".into()
            }
            .to_string(),
            "operation aborted by user"
        );
        assert_eq!(
            AgentError::ConfirmationTimeout {
                tool: "delete_file".into(),
                timeout_secs: 120
            }
            .to_string(),
            "confirmation timeout"
        );
    }

    #[test]
    fn test_overload_message_names_retry_count() {
        let err = AgentError::ProviderOverloaded {
            retries: 5,
            source: InferenceError::HttpError {
                status: 529,
                body: "overloaded".into(),
            },
        };
        assert!(err.to_string().starts_with("provider overloaded after 5 retries"));
    }
}
