//! Outbound side of the event bus.
//!
//! Every [`EventSink`] clone writes to the same ordered channel and shares
//! one "awaiting confirmation" flag. While the flag is set, everything but
//! `confirmation_required` is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use super::types::PromptEvent;

#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::Sender<PromptEvent>,
    awaiting: Arc<AtomicBool>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<PromptEvent>) -> Self {
        Self {
            tx,
            awaiting: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Publish one event, unless a confirmation is outstanding.
    ///
    /// A closed receiver is logged; the engine keeps running without a
    /// listener.
    pub async fn emit(&self, event: PromptEvent) {
        if self.is_awaiting() && !matches!(event, PromptEvent::ConfirmationRequired(_)) {
            tracing::debug!(kind = event.kind(), "event suppressed while awaiting confirmation");
            return;
        }

        let kind = event.kind();
        if self.tx.send(event).await.is_err() {
            tracing::debug!(kind, "event receiver dropped");
        }
    }

    pub fn set_awaiting(&self, awaiting: bool) {
        self.awaiting.store(awaiting, Ordering::SeqCst);
    }

    pub fn is_awaiting(&self) -> bool {
        self.awaiting.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent_core::types::ConfirmationRequest;

    fn confirmation() -> PromptEvent {
        PromptEvent::ConfirmationRequired(ConfirmationRequest {
            token: "t".into(),
            server: "fs".into(),
            tool: "delete_file".into(),
            args: "{}".into(),
        })
    }

    #[tokio::test]
    async fn test_events_arrive_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        sink.emit(PromptEvent::Error("one".into())).await;
        sink.emit(PromptEvent::Error("two".into())).await;
        assert_eq!(rx.recv().await, Some(PromptEvent::Error("one".into())));
        assert_eq!(rx.recv().await, Some(PromptEvent::Error("two".into())));
    }

    #[tokio::test]
    async fn test_clones_share_suppression() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        let other = sink.clone();

        sink.set_awaiting(true);
        other.emit(PromptEvent::Error("hidden".into())).await;
        sink.emit(confirmation()).await;
        sink.set_awaiting(false);
        other.emit(PromptEvent::Error("visible".into())).await;

        assert_eq!(rx.recv().await.map(|e| e.kind()), Some("confirmation_required"));
        assert_eq!(rx.recv().await, Some(PromptEvent::Error("visible".into())));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_receiver_is_not_fatal() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        EventSink::new(tx).emit(PromptEvent::Error("nobody".into())).await;
    }
}
