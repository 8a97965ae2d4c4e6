//! Inference error types.
//!
//! All errors implement `std::error::Error` via `thiserror`. Structured logging
//! is the caller's responsibility; these types carry the context needed to
//! build meaningful log entries.

use thiserror::Error;

/// Errors that can occur while asking a provider for a message.
#[derive(Debug, Error)]
pub enum InferenceError {
    /// TCP/HTTP connection to the provider failed.
    #[error("connection failed to {endpoint}: {reason}")]
    ConnectionFailed {
        endpoint: String,
        reason: String,
    },

    /// The provider did not respond within the configured timeout.
    #[error("inference timeout after {duration_secs}s")]
    Timeout {
        duration_secs: u64,
    },

    /// The provider said it is overloaded and the request may be retried.
    #[error("provider overloaded: {reason}")]
    Overloaded {
        reason: String,
    },

    /// Non-2xx HTTP response from the provider.
    #[error("HTTP {status}: {body}")]
    HttpError {
        status: u16,
        body: String,
    },

    /// The response body could not be decoded into a message.
    #[error("invalid provider response: {reason}")]
    InvalidResponse {
        reason: String,
    },

    /// SSE stream parsing or chunk-level error.
    #[error("stream error: {reason}")]
    StreamError {
        reason: String,
    },

    /// Missing or invalid provider configuration. Never retried.
    #[error("config error: {reason}")]
    ConfigError {
        reason: String,
    },
}

impl InferenceError {
    /// Whether this is the transient "overloaded" signature worth retrying.
    ///
    /// Matches HTTP 529 and 503, the explicit [`InferenceError::Overloaded`]
    /// variant, and error bodies mentioning "overloaded" (e.g. Anthropic's
    /// `overloaded_error`).
    pub fn is_overloaded(&self) -> bool {
        match self {
            InferenceError::Overloaded { .. } => true,
            InferenceError::HttpError { status: 529 | 503, .. } => true,
            InferenceError::HttpError { body, .. } => body.to_lowercase().contains("overloaded"),
            _ => false,
        }
    }

    /// Extract the error body text, if this is an `HttpError`.
    pub fn error_body(&self) -> Option<&str> {
        match self {
            InferenceError::HttpError { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overloaded_statuses() {
        for status in [529, 503] {
            let err = InferenceError::HttpError {
                status,
                body: String::new(),
            };
            assert!(err.is_overloaded(), "status {status}");
        }
    }

    #[test]
    fn test_overloaded_body() {
        let err = InferenceError::HttpError {
            status: 500,
            body: r#"{"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#
                .to_string(),
        };
        assert!(err.is_overloaded());
    }

    #[test]
    fn test_not_overloaded() {
        let err = InferenceError::HttpError {
            status: 400,
            body: "invalid request".to_string(),
        };
        assert!(!err.is_overloaded());
        assert!(!InferenceError::Timeout { duration_secs: 5 }.is_overloaded());
        assert!(InferenceError::Overloaded { reason: "busy".into() }.is_overloaded());
    }

    #[test]
    fn test_error_body() {
        let err = InferenceError::HttpError {
            status: 500,
            body: "test body".to_string(),
        };
        assert_eq!(err.error_body(), Some("test body"));
        assert!(InferenceError::Timeout { duration_secs: 5 }.error_body().is_none());
    }
}
