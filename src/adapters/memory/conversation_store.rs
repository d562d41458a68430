//! In-memory implementation of the conversation store.
//!
//! Backs tests and local development. Honors the same contract as the
//! Postgres adapter: durable-within-process appends, per-conversation
//! ordering by creation time with insertion order breaking ties.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::conversation::{Conversation, Message, Role};
use crate::domain::foundation::{ConversationId, UserId};
use crate::ports::{ConversationDetail, ConversationStore, StoreError};

#[derive(Default)]
struct Inner {
    conversations: HashMap<ConversationId, Conversation>,
    // Messages per conversation, tagged with a global insertion sequence
    // used to break creation-time ties.
    messages: HashMap<ConversationId, Vec<(u64, Message)>>,
    next_seq: u64,
}

impl Inner {
    fn ordered_messages(&self, conversation_id: &ConversationId) -> Vec<Message> {
        let mut entries = self
            .messages
            .get(conversation_id)
            .cloned()
            .unwrap_or_default();
        entries.sort_by(|(seq_a, a), (seq_b, b)| {
            a.created_at()
                .cmp(b.created_at())
                .then(seq_a.cmp(seq_b))
        });
        entries.into_iter().map(|(_, message)| message).collect()
    }
}

/// In-memory conversation store.
#[derive(Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
}

impl InMemoryConversationStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored messages across all conversations.
    ///
    /// Test hook for exactly-once assertions.
    pub async fn message_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.messages.values().map(|v| v.len()).sum()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, owner_id: &UserId) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(owner_id.clone());
        let mut inner = self.inner.write().await;
        inner
            .messages
            .insert(*conversation.id(), Vec::new());
        inner
            .conversations
            .insert(*conversation.id(), conversation.clone());
        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<ConversationDetail, StoreError> {
        let inner = self.inner.read().await;
        let conversation = inner
            .conversations
            .get(id)
            .cloned()
            .ok_or(StoreError::NotFound(*id))?;
        Ok(ConversationDetail {
            messages: inner.ordered_messages(id),
            conversation,
        })
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.conversations.contains_key(conversation_id) {
            return Err(StoreError::NotFound(*conversation_id));
        }

        let message = Message::new(*conversation_id, role, content)
            .map_err(|e| StoreError::InvalidContent(e.to_string()))?;

        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner
            .messages
            .entry(*conversation_id)
            .or_default()
            .push((seq, message.clone()));
        if let Some(conversation) = inner.conversations.get_mut(conversation_id) {
            conversation.touch();
        }
        Ok(message)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        let inner = self.inner.read().await;
        if !inner.conversations.contains_key(conversation_id) {
            return Err(StoreError::NotFound(*conversation_id));
        }

        let ordered = inner.ordered_messages(conversation_id);
        let start = ordered.len().saturating_sub(limit);
        Ok(ordered[start..].to_vec())
    }
}
