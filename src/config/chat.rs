//! Chat pipeline configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Chat pipeline configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    /// Fixed system instruction prepended to every context window
    #[serde(default = "default_system_prompt")]
    pub system_prompt: String,

    /// How many of the most recent messages enter the context window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Hard cap on total context content length, in characters
    #[serde(default = "default_max_context_chars")]
    pub max_context_chars: usize,

    /// Defensive cap on one streaming session's lifetime, in seconds
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,
}

impl ChatConfig {
    /// Get the session timeout as Duration
    pub fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.session_timeout_secs)
    }

    /// Validate chat configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.window_size == 0 {
            return Err(ValidationError::InvalidContextWindow);
        }
        if self.max_context_chars < self.system_prompt.len() {
            return Err(ValidationError::InvalidContextWindow);
        }
        if self.session_timeout_secs == 0 {
            return Err(ValidationError::InvalidSessionTimeout);
        }
        Ok(())
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            system_prompt: default_system_prompt(),
            window_size: default_window_size(),
            max_context_chars: default_max_context_chars(),
            session_timeout_secs: default_session_timeout(),
        }
    }
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

fn default_window_size() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    16_000
}

fn default_session_timeout() -> u64 {
    120
}
