//! Output transport port - the client-facing delivery boundary.
//!
//! The core never depends on the wire encoding; it only emits fragments,
//! one terminal success marker, or one terminal error event. Delivery
//! failures are the transport's problem: the peer may already be gone, so
//! all three operations are infallible from the session's point of view.

use async_trait::async_trait;

/// Generic error category delivered to the peer.
///
/// Internal error detail must not cross this boundary; the kind maps to a
/// short, generic client-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The referenced conversation does not exist.
    NotFound,
    /// The caller does not own the conversation.
    Forbidden,
    /// The upstream generator failed mid-stream.
    Upstream,
    /// Anything else.
    Internal,
}

impl TransportErrorKind {
    /// Client-facing message for this error kind.
    pub fn public_message(&self) -> &'static str {
        match self {
            TransportErrorKind::NotFound => "Conversation not found",
            TransportErrorKind::Forbidden => "Forbidden",
            TransportErrorKind::Upstream | TransportErrorKind::Internal => {
                "Internal Server Error"
            }
        }
    }
}

/// Port for delivering generated output to the client.
#[async_trait]
pub trait OutputTransport: Send + Sync {
    /// Delivers one incremental fragment.
    async fn emit(&self, fragment: &str);

    /// Delivers the end-of-stream marker after successful completion.
    async fn end(&self);

    /// Delivers a terminal error event with a generic message.
    async fn error(&self, kind: TransportErrorKind);
}
