//! Command and query handlers over the ports.

mod create_conversation;
mod get_conversation;

pub use create_conversation::{
    CreateConversationCommand, CreateConversationError, CreateConversationHandler,
};
pub use get_conversation::{GetConversationError, GetConversationHandler, GetConversationQuery};
