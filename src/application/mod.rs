//! Application layer: the streaming session pipeline and its handlers.

pub mod handlers;
mod stream_session;
mod token_bridge;

pub use stream_session::{
    SessionError, SessionOutcome, SessionState, StreamRequest, StreamSession,
    DEFAULT_SESSION_TIMEOUT,
};
pub use token_bridge::TokenStreamBridge;
