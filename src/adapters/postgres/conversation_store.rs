//! PostgreSQL implementation of the conversation store.
//!
//! Appends are transactional: the message insert and the conversation
//! `updated_at` bump commit together, so an append is durable before the
//! call returns. Messages carry a `seq` column that breaks creation-time
//! ties with insertion order.

use async_trait::async_trait;
use sqlx::{PgPool, Row};

use crate::domain::conversation::{Conversation, Message, Role};
use crate::domain::foundation::{ConversationId, MessageId, Timestamp, UserId};
use crate::ports::{ConversationDetail, ConversationStore, StoreError};

/// PostgreSQL conversation store.
#[derive(Clone)]
pub struct PostgresConversationStore {
    pool: PgPool,
}

impl PostgresConversationStore {
    /// Creates a store over the given pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_messages(
        &self,
        conversation_id: &ConversationId,
        limit: Option<i64>,
    ) -> Result<Vec<Message>, StoreError> {
        // Most recent `limit` rows, returned ascending.
        let rows = match limit {
            Some(limit) => {
                sqlx::query(
                    r#"
                    SELECT id, conversation_id, role, content, created_at FROM (
                        SELECT id, conversation_id, role, content, created_at, seq
                        FROM messages
                        WHERE conversation_id = $1
                        ORDER BY created_at DESC, seq DESC
                        LIMIT $2
                    ) recent
                    ORDER BY created_at ASC, seq ASC
                    "#,
                )
                .bind(conversation_id.as_uuid())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT id, conversation_id, role, content, created_at
                    FROM messages
                    WHERE conversation_id = $1
                    ORDER BY created_at ASC, seq ASC
                    "#,
                )
                .bind(conversation_id.as_uuid())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(StoreError::database)?;

        rows.iter()
            .map(|row| {
                let id: uuid::Uuid = row.get("id");
                let conversation_uuid: uuid::Uuid = row.get("conversation_id");
                let role_str: &str = row.get("role");
                let content: String = row.get("content");
                let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");

                let role = Role::parse(role_str).map_err(StoreError::database)?;
                Ok(Message::reconstitute(
                    MessageId::from_uuid(id),
                    ConversationId::from_uuid(conversation_uuid),
                    role,
                    content,
                    Timestamp::from_datetime(created_at),
                ))
            })
            .collect()
    }

    async fn fetch_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<Conversation, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT id, owner_id, title, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(StoreError::database)?
        .ok_or(StoreError::NotFound(*id))?;

        let id_uuid: uuid::Uuid = row.get("id");
        let owner_id: String = row.get("owner_id");
        let title: String = row.get("title");
        let created_at: chrono::DateTime<chrono::Utc> = row.get("created_at");
        let updated_at: chrono::DateTime<chrono::Utc> = row.get("updated_at");

        let owner_id = UserId::new(owner_id).map_err(StoreError::database)?;
        Ok(Conversation::reconstitute(
            ConversationId::from_uuid(id_uuid),
            owner_id,
            title,
            Timestamp::from_datetime(created_at),
            Timestamp::from_datetime(updated_at),
        ))
    }
}

#[async_trait]
impl ConversationStore for PostgresConversationStore {
    async fn create_conversation(&self, owner_id: &UserId) -> Result<Conversation, StoreError> {
        let conversation = Conversation::new(owner_id.clone());

        sqlx::query(
            r#"
            INSERT INTO conversations (id, owner_id, title, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(conversation.id().as_uuid())
        .bind(conversation.owner_id().as_str())
        .bind(conversation.title())
        .bind(conversation.created_at().as_datetime())
        .bind(conversation.updated_at().as_datetime())
        .execute(&self.pool)
        .await
        .map_err(StoreError::database)?;

        Ok(conversation)
    }

    async fn get_conversation(
        &self,
        id: &ConversationId,
    ) -> Result<ConversationDetail, StoreError> {
        let conversation = self.fetch_conversation(id).await?;
        let messages = self.fetch_messages(id, None).await?;
        Ok(ConversationDetail {
            conversation,
            messages,
        })
    }

    async fn append_message(
        &self,
        conversation_id: &ConversationId,
        role: Role,
        content: &str,
    ) -> Result<Message, StoreError> {
        let message = Message::new(*conversation_id, role, content)
            .map_err(|e| StoreError::InvalidContent(e.to_string()))?;

        let mut tx = self.pool.begin().await.map_err(StoreError::database)?;

        // Lock the parent row so the append either lands on an existing
        // conversation or fails cleanly.
        let parent = sqlx::query("SELECT id FROM conversations WHERE id = $1 FOR UPDATE")
            .bind(conversation_id.as_uuid())
            .fetch_optional(&mut *tx)
            .await
            .map_err(StoreError::database)?;
        if parent.is_none() {
            return Err(StoreError::NotFound(*conversation_id));
        }

        sqlx::query(
            r#"
            INSERT INTO messages (id, conversation_id, role, content, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(message.id().as_uuid())
        .bind(conversation_id.as_uuid())
        .bind(message.role().as_str())
        .bind(message.content())
        .bind(message.created_at().as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(StoreError::database)?;

        sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(conversation_id.as_uuid())
            .bind(message.created_at().as_datetime())
            .execute(&mut *tx)
            .await
            .map_err(StoreError::database)?;

        tx.commit().await.map_err(StoreError::database)?;

        Ok(message)
    }

    async fn list_recent_messages(
        &self,
        conversation_id: &ConversationId,
        limit: usize,
    ) -> Result<Vec<Message>, StoreError> {
        // Existence check keeps the NotFound contract for empty logs too.
        self.fetch_conversation(conversation_id).await?;
        self.fetch_messages(conversation_id, Some(limit as i64))
            .await
    }
}
