//! AI provider port - interface to the upstream text-generation service.
//!
//! The provider is consumed as an opaque streaming capability: a request
//! carries an ordered list of role-tagged messages and yields a lazy
//! sequence of text fragments, or fails with a typed provider error.
//!
//! # Design
//!
//! - Provider-agnostic message format
//! - Streaming-only contract; the fragment sequence is not restartable
//! - Error types for common failure modes (rate limits, timeouts, etc.)

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;

use crate::domain::conversation::{ContextMessage, ContextWindow, Role};

/// Lazy sequence of generated text fragments.
///
/// Finite unless the upstream misbehaves; a single `Err` item terminates
/// the sequence. Dropping the stream releases the upstream request.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Port for the upstream text-generation provider.
///
/// Implementations connect to an external AI service and translate between
/// the provider-specific wire protocol and this contract. A single client is
/// constructed from config at startup and shared by reference into sessions.
#[async_trait]
pub trait AiProvider: Send + Sync {
    /// Opens one streaming generation call for the given request.
    ///
    /// The returned stream yields fragments as they are produced. The call
    /// is not restartable; to retry, open a new stream.
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, ProviderError>;

    /// Estimates token count for text (heuristic, for window sizing).
    fn estimate_tokens(&self, text: &str) -> u32;

    /// Returns provider identification for logging.
    fn provider_info(&self) -> ProviderInfo;
}

/// Request for a streaming chat generation.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Ordered, role-tagged messages (system instruction first).
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature.
    pub temperature: Option<f32>,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
}

impl ChatRequest {
    /// Creates an empty request.
    pub fn new() -> Self {
        Self {
            messages: Vec::new(),
            temperature: None,
            max_tokens: None,
        }
    }

    /// Adds a message.
    pub fn with_message(mut self, role: ChatRole, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
        self
    }

    /// Sets the sampling temperature.
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Sets the generation cap.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

impl Default for ChatRequest {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&ContextWindow> for ChatRequest {
    fn from(window: &ContextWindow) -> Self {
        Self {
            messages: window.messages.iter().map(ChatMessage::from).collect(),
            temperature: None,
            max_tokens: None,
        }
    }
}

/// A provider-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Who authored this message.
    pub role: ChatRole,
    /// Message content.
    pub content: String,
}

impl From<&ContextMessage> for ChatMessage {
    fn from(entry: &ContextMessage) -> Self {
        Self {
            role: entry.role.into(),
            content: entry.content.clone(),
        }
    }
}

/// Provider-facing role of a message author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    /// System instructions.
    System,
    /// User input.
    User,
    /// Assistant output.
    Assistant,
}

impl From<Role> for ChatRole {
    fn from(role: Role) -> Self {
        match role {
            Role::System => ChatRole::System,
            Role::User => ChatRole::User,
            Role::Assistant => ChatRole::Assistant,
        }
    }
}

/// Provider identification for logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider name (e.g., "deepseek", "mock").
    pub name: String,
    /// Model identifier.
    pub model: String,
}

impl ProviderInfo {
    /// Creates new provider info.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: model.into(),
        }
    }
}

/// AI provider errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    /// Rate limited by provider.
    #[error("rate limited: retry after {retry_after_secs}s")]
    RateLimited {
        /// Seconds until retry is allowed.
        retry_after_secs: u32,
    },

    /// Provider is unavailable.
    #[error("provider unavailable: {message}")]
    Unavailable {
        /// Error details.
        message: String,
    },

    /// API key or authentication failed.
    #[error("authentication failed")]
    AuthenticationFailed,

    /// Network error during request or mid-stream.
    #[error("network error: {0}")]
    Network(String),

    /// Failed to parse provider response.
    #[error("parse error: {0}")]
    Parse(String),

    /// Invalid request configuration.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Request timed out.
    #[error("request timed out after {timeout_secs}s")]
    Timeout {
        /// Configured timeout.
        timeout_secs: u32,
    },
}

impl ProviderError {
    /// Creates a rate limited error.
    pub fn rate_limited(retry_after_secs: u32) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Creates an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Creates a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse(message.into())
    }

    /// Returns true if a fresh call might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited { .. }
                | ProviderError::Unavailable { .. }
                | ProviderError::Network(_)
                | ProviderError::Timeout { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::conversation::{ContextAssembler, ContextPolicy};

    #[test]
    fn chat_request_builder_works() {
        let request = ChatRequest::new()
            .with_message(ChatRole::System, "Be helpful")
            .with_message(ChatRole::User, "Hello")
            .with_temperature(0.7)
            .with_max_tokens(512);

        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(512));
    }

    #[test]
    fn chat_role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ChatRole::User).unwrap(), "\"user\"");
        assert_eq!(
            serde_json::to_string(&ChatRole::Assistant).unwrap(),
            "\"assistant\""
        );
        assert_eq!(
            serde_json::to_string(&ChatRole::System).unwrap(),
            "\"system\""
        );
    }

    #[test]
    fn chat_request_from_context_window_maps_roles() {
        let assembler = ContextAssembler::new(ContextPolicy::new("sys"));
        let window = assembler.assemble(&[]);
        let request = ChatRequest::from(&window);

        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.messages[0].role, ChatRole::System);
        assert_eq!(request.messages[0].content, "sys");
    }

    #[test]
    fn retryable_classification() {
        assert!(ProviderError::rate_limited(30).is_retryable());
        assert!(ProviderError::unavailable("down").is_retryable());
        assert!(ProviderError::network("reset").is_retryable());
        assert!(ProviderError::Timeout { timeout_secs: 30 }.is_retryable());

        assert!(!ProviderError::AuthenticationFailed.is_retryable());
        assert!(!ProviderError::parse("bad json").is_retryable());
        assert!(!ProviderError::InvalidRequest("empty".into()).is_retryable());
    }
}
