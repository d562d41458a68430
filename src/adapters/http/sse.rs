//! SSE encoding for the streaming chat endpoint.
//!
//! Wire framing:
//! - fragment: `data: {"content": "<text>"}`
//! - completion: `data: [DONE]`
//! - failure: `event: error` + `data: {"message": "<generic message>"}`
//!
//! The response stream owns the session's cancellation token; when the
//! client disconnects axum drops the stream, which cancels the token and
//! aborts the session at the next fragment boundary.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;

use super::transport::TransportEvent;

/// Builds the SSE response for a streaming session.
pub fn sse_response(
    rx: mpsc::Receiver<TransportEvent>,
    cancel: CancellationToken,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = DisconnectStream {
        inner: ReceiverStream::new(rx),
        cancel,
    };
    Sse::new(futures::StreamExt::map(stream, |event| Ok(encode_event(event))))
        .keep_alive(KeepAlive::default())
}

/// Encodes one transport event as an SSE frame.
fn encode_event(event: TransportEvent) -> Event {
    match event {
        TransportEvent::Fragment(content) => {
            Event::default().data(json!({ "content": content }).to_string())
        }
        TransportEvent::End => Event::default().data("[DONE]"),
        TransportEvent::Error(kind) => Event::default()
            .event("error")
            .data(json!({ "message": kind.public_message() }).to_string()),
    }
}

/// Receiver stream that cancels the session token when dropped.
struct DisconnectStream {
    inner: ReceiverStream<TransportEvent>,
    cancel: CancellationToken,
}

impl Stream for DisconnectStream {
    type Item = TransportEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl Drop for DisconnectStream {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
