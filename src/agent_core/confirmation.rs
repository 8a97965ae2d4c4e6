//! Confirmation gate for mutating tool calls.
//!
//! A call is sensitive when its bare tool name, or the JSON text of its
//! arguments, contains one of the mutating verbs as a whole word. Sensitive
//! calls are held until the caller answers with the matching token.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::sync::mpsc;
use tokio::time::Instant;
use uuid::Uuid;

use super::errors::AgentError;
use super::events::EventSink;
use super::types::{ConfirmationReply, ConfirmationRequest, PromptEvent};

// ─── Constants ──────────────────────────────────────────────────────────────

/// How long a sensitive call waits for the caller's reply.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Mutating verbs. Underscores, dashes and dots count as word breaks so
/// `delete_file` matches while `address` does not.
static SENSITIVE_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[^a-z0-9])(create|insert|add|update|modify|patch|put|delete|remove|drop|write|send|post|publish)(?:$|[^a-z0-9])",
    )
    .expect("sensitive verb pattern is valid")
});

/// Boundary between a lowercase letter or digit and an uppercase letter.
static CAMEL_BOUNDARY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("camel case pattern is valid"));

// ─── Classification ─────────────────────────────────────────────────────────

fn mentions_verb(text: &str) -> bool {
    let spaced = CAMEL_BOUNDARY.replace_all(text, "$1 $2");
    SENSITIVE_VERBS.is_match(&spaced)
}

/// Whether a call to `tool` with `args` needs the caller's approval.
pub fn is_sensitive(tool: &str, args: &serde_json::Map<String, serde_json::Value>) -> bool {
    if mentions_verb(tool) {
        return true;
    }
    serde_json::to_string(args)
        .map(|text| mentions_verb(&text))
        .unwrap_or(false)
}

pub fn mint_token() -> String {
    Uuid::new_v4().to_string()
}

// ─── ConfirmationGate ───────────────────────────────────────────────────────

/// Engine-side end of the confirmation channel.
pub struct ConfirmationGate {
    replies: mpsc::Receiver<ConfirmationReply>,
    timeout: Duration,
}

impl ConfirmationGate {
    pub fn new(replies: mpsc::Receiver<ConfirmationReply>, timeout: Duration) -> Self {
        Self { replies, timeout }
    }

    /// Ask the caller to approve `server`/`tool` and wait for the answer.
    ///
    /// Other events are suppressed on `sink` until this returns.
    pub async fn request(
        &mut self,
        sink: &EventSink,
        server: &str,
        tool: &str,
        args: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AgentError> {
        self.drain_stale();

        let token = mint_token();
        let request = ConfirmationRequest {
            token: token.clone(),
            server: server.to_string(),
            tool: tool.to_string(),
            args: serde_json::to_string_pretty(args).unwrap_or_else(|_| "{}".to_string()),
        };

        tracing::info!(server, tool, "awaiting confirmation");
        sink.set_awaiting(true);
        sink.emit(PromptEvent::ConfirmationRequired(request)).await;
        let outcome = self.wait(&token, tool).await;
        sink.set_awaiting(false);

        match &outcome {
            Ok(()) => tracing::info!(server, tool, "confirmation approved"),
            Err(e) => tracing::warn!(server, tool, error = %e, "confirmation not granted"),
        }
        outcome
    }

    /// Wait for the reply carrying `token`. Replies with other tokens are
    /// discarded and do not extend the deadline.
    pub async fn wait(&mut self, token: &str, tool: &str) -> Result<(), AgentError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.replies.recv()).await {
                Err(_) => {
                    return Err(AgentError::ConfirmationTimeout {
                        tool: tool.to_string(),
                        timeout_secs: self.timeout.as_secs(),
                    })
                }
                Ok(None) => return Err(AgentError::ChannelClosed { channel: "confirmation" }),
                Ok(Some(reply)) if reply.token != token => {
                    tracing::debug!(expected = token, got = %reply.token, "ignoring mismatched confirmation");
                }
                Ok(Some(reply)) if reply.approved => return Ok(()),
                Ok(Some(_)) => {
                    return Err(AgentError::Rejected {
                        tool: tool.to_string(),
                    })
                }
            }
        }
    }

    /// Discard replies left over from earlier requests.
    pub fn drain_stale(&mut self) {
        let mut dropped = 0usize;
        while self.replies.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(dropped, "discarded stale confirmation replies");
        }
    }
}

// ─── Tests ──────────────────────────────────────────────────────────────────
