//! Context window assembly for upstream generation requests.
//!
//! Builds the bounded prompt window sent to the AI provider: a fixed system
//! instruction followed by the most recent stored messages in chronological
//! order. The window is capped both by message count and by total content
//! size so unbounded history never produces an unbounded request.

use crate::domain::conversation::{Message, Role};
use serde::{Deserialize, Serialize};

/// Rough heuristic: ~4 characters per token for the models we target.
const CHARS_PER_TOKEN: usize = 4;

/// Policy governing how the context window is built.
#[derive(Debug, Clone)]
pub struct ContextPolicy {
    /// How many of the most recent messages to consider.
    pub window_size: usize,
    /// Hard cap on total content length (chars) across the whole window.
    pub max_context_chars: usize,
    /// Fixed system instruction prepended to every window.
    pub system_prompt: String,
}

impl ContextPolicy {
    /// Creates a policy with the given system prompt and default bounds.
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            window_size: default_window_size(),
            max_context_chars: default_max_context_chars(),
            system_prompt: system_prompt.into(),
        }
    }

    /// Sets the message-count window.
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Sets the hard character cap.
    pub fn with_max_context_chars(mut self, max_context_chars: usize) -> Self {
        self.max_context_chars = max_context_chars;
        self
    }
}

impl Default for ContextPolicy {
    fn default() -> Self {
        Self::new(default_system_prompt())
    }
}

fn default_window_size() -> usize {
    10
}

fn default_max_context_chars() -> usize {
    16_000
}

fn default_system_prompt() -> String {
    "You are a helpful assistant.".to_string()
}

/// One entry of an assembled context window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextMessage {
    /// The role of the entry.
    pub role: Role,
    /// The content of the entry.
    pub content: String,
}

impl ContextMessage {
    /// Creates a system entry.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    /// Creates an entry with the given role.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// The assembled, bounded window handed to the upstream provider.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    /// Entries in chronological order, system instruction first.
    pub messages: Vec<ContextMessage>,
    /// Number of history entries dropped to satisfy the character cap.
    pub truncated_count: usize,
}

impl ContextWindow {
    /// Returns true if any history entries were dropped.
    pub fn was_truncated(&self) -> bool {
        self.truncated_count > 0
    }

    /// Total content length across all entries.
    pub fn content_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }

    /// Estimated token count for the window.
    pub fn estimated_tokens(&self) -> u32 {
        (self.content_chars() / CHARS_PER_TOKEN).max(1) as u32
    }
}

/// Builds context windows from stored history.
///
/// Windowing is pure: assembling a context reads the history slice and
/// touches nothing else.
#[derive(Debug, Clone, Default)]
pub struct ContextAssembler {
    policy: ContextPolicy,
}

impl ContextAssembler {
    /// Creates an assembler with the given policy.
    pub fn new(policy: ContextPolicy) -> Self {
        Self { policy }
    }

    /// Returns the policy in effect.
    pub fn policy(&self) -> &ContextPolicy {
        &self.policy
    }

    /// Assembles the prompt window from stored history.
    ///
    /// `history` must be in ascending creation order; the most recent
    /// `window_size` entries are kept, then the oldest non-system entries
    /// are dropped until the window fits under the character cap. The
    /// system instruction and the newest entry are never dropped.
    pub fn assemble(&self, history: &[Message]) -> ContextWindow {
        let start = history.len().saturating_sub(self.policy.window_size);
        let mut entries: Vec<ContextMessage> = history[start..]
            .iter()
            .map(|m| ContextMessage::new(m.role(), m.content()))
            .collect();

        let system_chars = self.policy.system_prompt.len();
        let mut truncated_count = 0;

        let over_cap = |entries: &[ContextMessage]| {
            let total: usize = system_chars + entries.iter().map(|m| m.content.len()).sum::<usize>();
            total > self.policy.max_context_chars
        };

        while entries.len() > 1 && over_cap(&entries) {
            // Oldest non-system entry goes first; stored history holds no
            // system rows in practice, but skip them if it ever does.
            let oldest = entries.iter().position(|m| m.role != Role::System);
            match oldest {
                Some(idx) => {
                    entries.remove(idx);
                    truncated_count += 1;
                }
                None => break,
            }
        }

        let mut messages = Vec::with_capacity(entries.len() + 1);
        messages.push(ContextMessage::system(&self.policy.system_prompt));
        messages.extend(entries);

        ContextWindow {
            messages,
            truncated_count,
        }
    }
}
