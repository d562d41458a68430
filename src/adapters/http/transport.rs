//! Channel-backed output transport.
//!
//! The session pushes wire-format-agnostic events into an mpsc queue; a
//! wire-specific encoder (SSE in production, a plain receiver in tests)
//! drains it. A dropped receiver means the peer is gone, which trips the
//! session's cancellation token.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::ports::{OutputTransport, TransportErrorKind};

/// Events crossing the delivery boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One incremental piece of generated text.
    Fragment(String),
    /// End-of-stream marker after successful completion.
    End,
    /// Terminal error event.
    Error(TransportErrorKind),
}

/// OutputTransport over an mpsc channel.
pub struct ChannelTransport {
    tx: mpsc::Sender<TransportEvent>,
    peer_gone: CancellationToken,
}

impl ChannelTransport {
    /// Creates a transport and the receiver that drains it.
    ///
    /// The returned cancellation behavior is inert; use [`Self::with_cancel`]
    /// to tie receiver drop to a session's token.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<TransportEvent>) {
        Self::with_cancel(capacity, CancellationToken::new())
    }

    /// Creates a transport that cancels `peer_gone` once the receiver is
    /// dropped.
    pub fn with_cancel(
        capacity: usize,
        peer_gone: CancellationToken,
    ) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, peer_gone }, rx)
    }

    async fn send(&self, event: TransportEvent) {
        if self.tx.send(event).await.is_err() {
            // Receiver dropped: the peer disconnected.
            self.peer_gone.cancel();
        }
    }
}

#[async_trait]
impl OutputTransport for ChannelTransport {
    async fn emit(&self, fragment: &str) {
        self.send(TransportEvent::Fragment(fragment.to_string()))
            .await;
    }

    async fn end(&self) {
        self.send(TransportEvent::End).await;
    }

    async fn error(&self, kind: TransportErrorKind) {
        self.send(TransportEvent::Error(kind)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn forwards_events_in_order() {
        let (transport, mut rx) = ChannelTransport::new(8);

        transport.emit("He").await;
        transport.emit("llo").await;
        transport.end().await;

        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Fragment("He".into()));
        assert_eq!(rx.recv().await.unwrap(), TransportEvent::Fragment("llo".into()));
        assert_eq!(rx.recv().await.unwrap(), TransportEvent::End);
    }

    #[tokio::test]
    async fn dropped_receiver_trips_cancellation() {
        let cancel = CancellationToken::new();
        let (transport, rx) = ChannelTransport::with_cancel(8, cancel.clone());

        drop(rx);
        transport.emit("lost").await;

        assert!(cancel.is_cancelled());
    }

    #[tokio::test]
    async fn error_event_carries_kind() {
        let (transport, mut rx) = ChannelTransport::new(8);
        transport.error(TransportErrorKind::Upstream).await;

        assert_eq!(
            rx.recv().await.unwrap(),
            TransportEvent::Error(TransportErrorKind::Upstream)
        );
    }
}
