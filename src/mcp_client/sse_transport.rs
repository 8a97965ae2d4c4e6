//! JSON-RPC over HTTP + server-sent events.
//!
//! The client opens a long-lived `GET` event stream. The server's first
//! `endpoint` event names the URL that requests are `POST`ed to; responses
//! come back on the event stream as `message` events and are matched to the
//! waiting caller by JSON-RPC id.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::{Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use reqwest::{StatusCode, Url};
use serde::Serialize;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::sse::{decode_events, SseError, SseEvent};

use super::config::parse_header_lines;
use super::errors::McpError;
use super::transport::next_request_id;
use super::types::{JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};

// ─── Constants ───────────────────────────────────────────────────────────────

/// TCP connection timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait for the server to announce its POST endpoint.
const ENDPOINT_TIMEOUT: Duration = Duration::from_secs(30);

type EventStream = Pin<Box<dyn Stream<Item = Result<SseEvent, SseError>> + Send>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>;

// ─── SseTransport ────────────────────────────────────────────────────────────

/// JSON-RPC transport to a remote tool server over HTTP + SSE.
pub struct SseTransport {
    server_name: String,
    http: reqwest::Client,
    /// URL announced by the `endpoint` event.
    endpoint: Url,
    headers: HeaderMap,
    /// Requests waiting for their response event.
    pending: PendingMap,
    /// Background task draining the event stream.
    reader: JoinHandle<()>,
}

impl SseTransport {
    /// Open the event stream and wait for the `endpoint` announcement.
    pub async fn connect(
        server_name: &str,
        url: &str,
        header_lines: &[String],
    ) -> Result<Self, McpError> {
        let connect_failed = |reason: String| McpError::ConnectFailed {
            name: server_name.to_string(),
            reason,
        };

        let base = Url::parse(url).map_err(|e| McpError::ConfigError {
            reason: format!("invalid url for server '{server_name}': {e}"),
        })?;
        let headers = build_header_map(server_name, header_lines);

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| connect_failed(format!("failed to build HTTP client: {e}")))?;

        let response = http
            .get(base.clone())
            .headers(headers.clone())
            .header(ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(|e| connect_failed(e.to_string()))?;

        let status = response.status();
        if is_auth_failure(status) {
            return Err(McpError::Unauthorized {
                server: server_name.to_string(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(connect_failed(format!("event stream returned HTTP {status}")));
        }

        let mut events: EventStream = Box::pin(decode_events(response.bytes_stream()));

        let announced = tokio::time::timeout(ENDPOINT_TIMEOUT, wait_for_endpoint(&mut events))
            .await
            .map_err(|_| {
                connect_failed(format!(
                    "no endpoint event within {}s",
                    ENDPOINT_TIMEOUT.as_secs()
                ))
            })?
            .map_err(connect_failed)?;

        let endpoint = base
            .join(announced.trim())
            .map_err(|e| connect_failed(format!("bad endpoint '{announced}': {e}")))?;

        tracing::debug!(server = server_name, endpoint = %endpoint, "sse endpoint announced");

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(route_responses(
            server_name.to_string(),
            events,
            Arc::clone(&pending),
        ));

        Ok(Self {
            server_name: server_name.to_string(),
            http,
            endpoint,
            headers,
            pending,
            reader,
        })
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<JsonRpcResponse>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn transport_error(&self, reason: String) -> McpError {
        McpError::TransportError {
            server: self.server_name.clone(),
            reason,
        }
    }

    /// POST a request and wait for its response on the event stream.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<JsonRpcResponse, McpError> {
        let id = next_request_id();
        let (_slot, rx) = PendingSlot::register(&self.pending, id);

        self.post(&JsonRpcRequest::new(id, method, params)).await?;

        rx.await
            .map_err(|_| self.transport_error("event stream closed before response".into()))
    }

    /// POST a notification.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), McpError> {
        self.post(&JsonRpcNotification::new(method, params)).await
    }

    async fn post<T: Serialize>(&self, body: &T) -> Result<(), McpError> {
        let response = self
            .http
            .post(self.endpoint.clone())
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await
            .map_err(|e| self.transport_error(format!("POST failed: {e}")))?;

        let status = response.status();
        if is_auth_failure(status) {
            return Err(McpError::Unauthorized {
                server: self.server_name.clone(),
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(self.transport_error(format!("POST returned HTTP {status}: {text}")));
        }
        Ok(())
    }

    /// Stop reading the event stream. Waiting requests fail.
    pub fn close(&self) {
        self.reader.abort();
        self.lock_pending().clear();
    }
}

impl Drop for SseTransport {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// A request's entry in the pending map, removed when the caller stops
/// waiting (answered, failed, or its future dropped on timeout).
struct PendingSlot {
    pending: PendingMap,
    id: u64,
}

impl PendingSlot {
    fn register(pending: &PendingMap, id: u64) -> (Self, oneshot::Receiver<JsonRpcResponse>) {
        let (tx, rx) = oneshot::channel();
        pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, tx);
        let slot = Self {
            pending: Arc::clone(pending),
            id,
        };
        (slot, rx)
    }
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.id);
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn is_auth_failure(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

/// Build a header map from `"Key: Value"` lines, skipping invalid entries.
fn build_header_map(server_name: &str, lines: &[String]) -> HeaderMap {
    let mut map = HeaderMap::new();
    for (key, value) in parse_header_lines(lines) {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => tracing::warn!(server = server_name, header = %key, "ignoring invalid header"),
        }
    }
    map
}

async fn wait_for_endpoint(events: &mut EventStream) -> Result<String, String> {
    while let Some(event) = events.next().await {
        match event {
            Ok(event) if event.name() == "endpoint" => return Ok(event.data),
            Ok(_) => continue,
            Err(e) => return Err(e.to_string()),
        }
    }
    Err("event stream closed before endpoint event".into())
}

/// Deliver `message` events to whichever request is waiting on their id.
async fn route_responses(server_name: String, mut events: EventStream, pending: PendingMap) {
    while let Some(event) = events.next().await {
        let event = match event {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(server = %server_name, error = %e, "sse stream failed");
                break;
            }
        };
        if event.name() != "message" {
            continue;
        }
        match JsonRpcResponse::from_frame(&event.data) {
            Some(resp) => {
                let waiter = pending
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .remove(&resp.id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(resp);
                    }
                    None => tracing::debug!(server = %server_name, id = resp.id, "unmatched response"),
                }
            }
            // Server-initiated requests and notifications are not routed.
            None => continue,
        }
    }

    tracing::debug!(server = %server_name, "sse stream ended");
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clear();
}

// ─── Tests ───────────────────────────────────────────────────────────────────
