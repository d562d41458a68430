//! GetConversation query handler.
//!
//! Fetches a conversation with its ordered message log, enforcing the
//! ownership invariant before anything is returned.

use std::sync::Arc;

use crate::domain::foundation::{ConversationId, UserId};
use crate::ports::{ConversationDetail, ConversationStore, StoreError};

/// Query for one conversation's detail.
#[derive(Debug, Clone)]
pub struct GetConversationQuery {
    /// The caller; must own the conversation.
    pub user_id: UserId,
    /// The conversation to fetch.
    pub conversation_id: ConversationId,
}

/// Errors from fetching a conversation.
#[derive(Debug, thiserror::Error)]
pub enum GetConversationError {
    /// No conversation with this id.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// The caller does not own the conversation.
    #[error("caller does not own this conversation")]
    Forbidden,

    /// Repository failure.
    #[error("store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for GetConversationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => GetConversationError::NotFound(id),
            other => GetConversationError::Store(other),
        }
    }
}

/// Handler for GetConversation queries.
pub struct GetConversationHandler<S: ConversationStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ConversationStore + ?Sized> GetConversationHandler<S> {
    /// Creates a new handler.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Fetches the conversation and its messages in ascending order.
    pub async fn handle(
        &self,
        query: GetConversationQuery,
    ) -> Result<ConversationDetail, GetConversationError> {
        let detail = self.store.get_conversation(&query.conversation_id).await?;

        if !detail.conversation.is_owned_by(&query.user_id) {
            tracing::warn!(
                conversation_id = %query.conversation_id,
                user_id = %query.user_id,
                "rejected read of another user's conversation"
            );
            return Err(GetConversationError::Forbidden);
        }

        Ok(detail)
    }
}
