//! CreateConversation command handler.

use std::sync::Arc;

use crate::domain::conversation::Conversation;
use crate::domain::foundation::UserId;
use crate::ports::{ConversationStore, StoreError};

/// Command to open a new conversation.
#[derive(Debug, Clone)]
pub struct CreateConversationCommand {
    /// The user who will own the conversation.
    pub user_id: UserId,
}

/// Errors from creating a conversation.
#[derive(Debug, thiserror::Error)]
pub enum CreateConversationError {
    /// Repository failure during persistence.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Handler for CreateConversation commands.
pub struct CreateConversationHandler<S: ConversationStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ConversationStore + ?Sized> CreateConversationHandler<S> {
    /// Creates a new handler.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Opens a conversation for the caller; always succeeds barring a
    /// store failure.
    pub async fn handle(
        &self,
        cmd: CreateConversationCommand,
    ) -> Result<Conversation, CreateConversationError> {
        let conversation = self.store.create_conversation(&cmd.user_id).await?;
        tracing::info!(
            conversation_id = %conversation.id(),
            owner_id = %conversation.owner_id(),
            "conversation created"
        );
        Ok(conversation)
    }
}
