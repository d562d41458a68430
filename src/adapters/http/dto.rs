//! Request/response DTOs for the chat endpoints.
//!
//! Non-streaming responses use the `{"code": ..., "data": ...}` envelope
//! the frontend expects.

use serde::{Deserialize, Serialize};

use crate::domain::conversation::{Conversation, Message, Role};
use crate::ports::ConversationDetail;

/// Response envelope for non-streaming endpoints.
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T> {
    /// Status code mirrored into the body.
    pub code: u16,
    /// Payload, absent on errors.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T> ApiEnvelope<T> {
    /// Successful envelope with data.
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            data: Some(data),
        }
    }
}

/// Body for `POST /chat/conversation`.
#[derive(Debug, Deserialize)]
pub struct CreateConversationBody {
    /// The caller's user id (validated upstream by the identity layer).
    pub user_id: String,
}

/// Query for `GET /chat/conversation`.
#[derive(Debug, Deserialize)]
pub struct ConversationDetailQuery {
    /// The caller's user id.
    pub user_id: String,
    /// The conversation id.
    pub id: String,
}

/// Body for `POST /chat/stream`.
///
/// `conversation_id` and `message` are optional so their absence can be
/// rejected with a 400 instead of a deserialization failure.
#[derive(Debug, Deserialize)]
pub struct StreamMessageBody {
    /// The conversation to stream into.
    pub conversation_id: Option<String>,
    /// The user's message.
    pub message: Option<String>,
    /// The caller's user id.
    pub user_id: String,
}

/// Conversation view for the detail endpoint.
#[derive(Debug, Serialize)]
pub struct ConversationView {
    /// Conversation id.
    pub id: String,
    /// Owner user id.
    pub user_id: String,
    /// Display title.
    pub title: String,
    /// Creation time (RFC 3339).
    pub created_at: String,
    /// Last update time (RFC 3339).
    pub updated_at: String,
    /// Messages in ascending creation order.
    pub messages: Vec<MessageView>,
}

/// Message view for the detail endpoint.
#[derive(Debug, Serialize)]
pub struct MessageView {
    /// Message id.
    pub id: String,
    /// Sender role.
    pub role: Role,
    /// Message content.
    pub content: String,
    /// Creation time (RFC 3339).
    pub created_at: String,
}

impl From<&Message> for MessageView {
    fn from(message: &Message) -> Self {
        Self {
            id: message.id().to_string(),
            role: message.role(),
            content: message.content().to_string(),
            created_at: message.created_at().as_datetime().to_rfc3339(),
        }
    }
}

impl ConversationView {
    /// Builds the view from a store detail result.
    pub fn from_detail(detail: &ConversationDetail) -> Self {
        Self::from_parts(&detail.conversation, &detail.messages)
    }

    fn from_parts(conversation: &Conversation, messages: &[Message]) -> Self {
        Self {
            id: conversation.id().to_string(),
            user_id: conversation.owner_id().to_string(),
            title: conversation.title().to_string(),
            created_at: conversation.created_at().as_datetime().to_rfc3339(),
            updated_at: conversation.updated_at().as_datetime().to_rfc3339(),
            messages: messages.iter().map(MessageView::from).collect(),
        }
    }
}
