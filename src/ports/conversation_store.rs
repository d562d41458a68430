//! Conversation store port.
//!
//! Defines the persistence contract for the append-only conversation log.
//! Implementations must make every append durable before returning and must
//! keep per-conversation append order equal to call order.

use crate::domain::conversation::{Conversation, Message, Role};
use crate::domain::foundation::{ConversationId, UserId};
use async_trait::async_trait;

/// A conversation together with its ordered message log.
#[derive(Debug, Clone)]
pub struct ConversationDetail {
    /// The conversation entity.
    pub conversation: Conversation,
    /// Messages in ascending creation order, ties broken by insertion order.
    pub messages: Vec<Message>,
}

/// Store port for the conversation log.
///
/// Implementations must ensure:
/// - concurrent reads and appends across different conversations do not
///   interfere
/// - within one conversation, append order matches call order
/// - an append is durable before the call returns
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Creates a new conversation for the given owner with the default title.
    async fn create_conversation(&self, owner_id: &UserId) -> Result<Conversation, StoreError>;

    /// Fetches a conversation with its full ordered message log.
    ///
    /// # Errors
    ///
    /// - `NotFound` if no conversation has this id
    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<ConversationDetail, StoreError>;

    /// Appends a message to a conversation's log.
    ///
    /// Persists atomically, bumps the conversation's `updated_at`, and
    /// returns the stored message with its id and timestamp.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the conversation does not exist
    /// - `InvalidContent` if the content is empty
    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError>;

    /// Lists the most recent `limit` messages in ascending creation order.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the conversation does not exist
    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError>;
}

/// Conversation store errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Referenced conversation does not exist.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// Message content failed domain validation.
    #[error("invalid message content: {0}")]
    InvalidContent(String),

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(String),
}

impl StoreError {
    /// Creates a database error from any displayable source.
    pub fn database(err: impl std::fmt::Display) -> Self {
        StoreError::Database(err.to_string())
    }

    /// Returns true if this error means the conversation is missing.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}
