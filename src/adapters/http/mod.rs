//! HTTP adapter: chat routes, DTOs, and the SSE delivery channel.

mod dto;
mod routes;
mod sse;
mod transport;

pub use dto::{ApiEnvelope, ConversationView, MessageView};
pub use routes::{chat_router, AppState};
pub use sse::sse_response;
pub use transport::{ChannelTransport, TransportEvent};
