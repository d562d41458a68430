//! Conversation domain: the owned message log and its context windowing.

mod context;
mod conversation;
mod message;

pub use context::{ContextAssembler, ContextMessage, ContextPolicy, ContextWindow};
pub use conversation::{Conversation, DEFAULT_TITLE};
pub use message::{Message, Role};
