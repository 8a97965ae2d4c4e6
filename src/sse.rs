//! Server-sent events decoder.
//!
//! Splits an HTTP body byte stream on blank-line boundaries and yields one
//! [`SseEvent`] per `event:`/`data:` block. Shared by the MCP SSE transport
//! and the streaming chat-completions backend.

use std::fmt::Display;

use futures::stream::{self, Stream, StreamExt};
use thiserror::Error;

/// One decoded server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// The `event:` field, if present (`None` means the default `message`).
    pub event: Option<String>,
    /// All `data:` lines joined with `\n`.
    pub data: String,
}

impl SseEvent {
    /// Event name with the SSE default applied.
    pub fn name(&self) -> &str {
        self.event.as_deref().unwrap_or("message")
    }
}

/// The underlying byte stream failed.
#[derive(Debug, Error)]
#[error("event stream read error: {0}")]
pub struct SseError(pub String);

/// Parse one event block. Returns `None` for comments and keep-alives.
pub fn parse_event_block(block: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        let (field, value) = match line.split_once(':') {
            Some((f, v)) => (f, v.strip_prefix(' ').unwrap_or(v)),
            None => (line, ""),
        };
        match field {
            "event" => event = Some(value.to_string()),
            "data" => data_lines.push(value),
            _ => {}
        }
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}

/// Decode a byte stream into SSE events.
///
/// Bytes are buffered across chunk boundaries so multi-byte characters and
/// events split over several chunks decode correctly. Any trailing block
/// without a terminating blank line is emitted when the stream ends.
pub fn decode_events<S, B, E>(byte_stream: S) -> impl Stream<Item = Result<SseEvent, SseError>>
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let byte_stream = Box::pin(byte_stream);

    stream::unfold(
        (byte_stream, Vec::<u8>::new(), false),
        |(mut byte_stream, mut buffer, finished)| async move {
            if finished {
                return None;
            }
            loop {
                if let Some(end) = find_boundary(&buffer) {
                    let block: Vec<u8> = buffer.drain(..end + 2).collect();
                    let text = String::from_utf8_lossy(&block);
                    match parse_event_block(&text) {
                        Some(event) => return Some((Ok(event), (byte_stream, buffer, false))),
                        None => continue,
                    }
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.extend(bytes.as_ref().iter().copied().filter(|b| *b != b'\r'));
                    }
                    Some(Err(e)) => {
                        return Some((Err(SseError(e.to_string())), (byte_stream, buffer, true)));
                    }
                    None => {
                        let rest = String::from_utf8_lossy(&buffer).to_string();
                        buffer.clear();
                        return parse_event_block(rest.trim())
                            .map(|event| (Ok(event), (byte_stream, buffer, true)));
                    }
                }
            }
        },
    )
}

/// Index of the first `\n\n` in `buffer`.
fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

// ─── Tests ───────────────────────────────────────────────────────────────────
