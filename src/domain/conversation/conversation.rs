//! Conversation entity.
//!
//! A conversation is an ordered, owned log of messages. The entity itself
//! only carries identity, ownership and title metadata; the message log is
//! held by the store and retrieved alongside it.

use crate::domain::foundation::{ConversationId, Timestamp, UserId};
use serde::{Deserialize, Serialize};

/// Default title assigned to a newly created conversation.
pub const DEFAULT_TITLE: &str = "New Chat";

/// An owned conversation.
///
/// # Invariants
///
/// - exclusively owned by one user; ownership never changes
/// - only `title` and `updated_at` are mutable after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    /// Unique identifier for this conversation.
    id: ConversationId,

    /// The user who owns this conversation.
    owner_id: UserId,

    /// Display title.
    title: String,

    /// When the conversation was created.
    created_at: Timestamp,

    /// When the conversation was last appended to or renamed.
    updated_at: Timestamp,
}

impl Conversation {
    /// Creates a new conversation for the given owner with the default title.
    pub fn new(owner_id: UserId) -> Self {
        let now = Timestamp::now();
        Self {
            id: ConversationId::new(),
            owner_id,
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes a conversation from persistence.
    pub fn reconstitute(
        id: ConversationId,
        owner_id: UserId,
        title: String,
        created_at: Timestamp,
        updated_at: Timestamp,
    ) -> Self {
        Self {
            id,
            owner_id,
            title,
            created_at,
            updated_at,
        }
    }

    /// Returns the conversation ID.
    pub fn id(&self) -> &ConversationId {
        &self.id
    }

    /// Returns the owner's user ID.
    pub fn owner_id(&self) -> &UserId {
        &self.owner_id
    }

    /// Returns the title.
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Returns when the conversation was created.
    pub fn created_at(&self) -> &Timestamp {
        &self.created_at
    }

    /// Returns when the conversation was last updated.
    pub fn updated_at(&self) -> &Timestamp {
        &self.updated_at
    }

    /// Checks whether the given user owns this conversation.
    ///
    /// Strict typed equality; there is no coercion between id forms.
    pub fn is_owned_by(&self, user_id: &UserId) -> bool {
        &self.owner_id == user_id
    }

    /// Renames the conversation, bumping `updated_at`.
    pub fn rename(&mut self, title: impl Into<String>) {
        self.title = title.into();
        self.updated_at = Timestamp::now();
    }

    /// Bumps `updated_at`, recording that the log grew.
    pub fn touch(&mut self) {
        self.updated_at = Timestamp::now();
    }
}
