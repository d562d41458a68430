//! Mock AI provider for tests.
//!
//! Scriptable implementation of the provider port: queue replies that stream
//! a fixed fragment sequence and then end, fail, or stall, without touching
//! a real API.
//!
//! # Example
//!
//! ```ignore
//! let provider = MockAiProvider::new()
//!     .with_fragments(["He", "llo"]);
//!
//! let stream = provider.stream_chat(request).await?;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::time::sleep;

use crate::ports::{AiProvider, ChatRequest, FragmentStream, ProviderError, ProviderInfo};

/// How one scripted call behaves after its fragments are exhausted.
#[derive(Debug, Clone)]
enum Tail {
    /// End the stream normally.
    End,
    /// Yield this error as the terminal item.
    Error(ProviderError),
    /// Never yield again (for timeout tests).
    Stall,
}

/// One scripted reply.
#[derive(Debug, Clone)]
pub struct MockReply {
    fragments: Vec<String>,
    tail: Tail,
}

impl MockReply {
    fn fragments<I, F>(fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        Self {
            fragments: fragments.into_iter().map(Into::into).collect(),
            tail: Tail::End,
        }
    }
}

/// Scriptable mock provider.
#[derive(Clone)]
pub struct MockAiProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    open_error: Arc<Mutex<Option<ProviderError>>>,
    delay: Duration,
    calls: Arc<Mutex<Vec<ChatRequest>>>,
}

impl Default for MockAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockAiProvider {
    /// Creates a mock with no scripted replies.
    ///
    /// An unscripted call streams a single "Mock reply" fragment.
    pub fn new() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            open_error: Arc::new(Mutex::new(None)),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Queues a reply that streams the given fragments and ends.
    pub fn with_fragments<I, F>(self, fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<String>,
    {
        self.replies
            .lock()
            .unwrap()
            .push_back(MockReply::fragments(fragments));
        self
    }

    /// Makes the most recently queued reply end with the given error.
    pub fn with_error_after(self, error: ProviderError) -> Self {
        self.amend_tail(Tail::Error(error));
        self
    }

    /// Makes the most recently queued reply stall forever after its
    /// fragments.
    pub fn with_stall_after_fragments(self) -> Self {
        self.amend_tail(Tail::Stall);
        self
    }

    /// Makes the next `stream_chat` call fail before streaming starts.
    pub fn with_open_error(self, error: ProviderError) -> Self {
        *self.open_error.lock().unwrap() = Some(error);
        self
    }

    /// Adds latency before each fragment.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of stream_chat calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// All recorded requests.
    pub fn recorded_requests(&self) -> Vec<ChatRequest> {
        self.calls.lock().unwrap().clone()
    }

    fn amend_tail(&self, tail: Tail) {
        let mut replies = self.replies.lock().unwrap();
        match replies.back_mut() {
            Some(reply) => reply.tail = tail,
            None => replies.push_back(MockReply {
                fragments: Vec::new(),
                tail,
            }),
        }
    }

    fn next_reply(&self) -> MockReply {
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| MockReply::fragments(["Mock reply"]))
    }
}

#[async_trait]
impl AiProvider for MockAiProvider {
    async fn stream_chat(&self, request: ChatRequest) -> Result<FragmentStream, ProviderError> {
        self.calls.lock().unwrap().push(request);

        if let Some(error) = self.open_error.lock().unwrap().take() {
            return Err(error);
        }

        let reply = self.next_reply();
        let delay = self.delay;

        let fragments = stream::iter(reply.fragments.into_iter().map(Ok)).then(move |item| {
            async move {
                if !delay.is_zero() {
                    sleep(delay).await;
                }
                item
            }
        });

        let stream: FragmentStream = match reply.tail {
            Tail::End => Box::pin(fragments),
            Tail::Error(error) => Box::pin(fragments.chain(stream::iter([Err(error)]))),
            Tail::Stall => Box::pin(fragments.chain(stream::pending())),
        };

        Ok(stream)
    }

    fn estimate_tokens(&self, text: &str) -> u32 {
        (text.len() / 4).max(1) as u32
    }

    fn provider_info(&self) -> ProviderInfo {
        ProviderInfo::new("mock", "mock-model")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ChatRole;

    fn request() -> ChatRequest {
        ChatRequest::new().with_message(ChatRole::User, "hi")
    }

    #[tokio::test]
    async fn streams_scripted_fragments_then_ends() {
        let provider = MockAiProvider::new().with_fragments(["He", "llo"]);

        let stream = provider.stream_chat(request()).await.unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "He");
        assert_eq!(items[1].as_ref().unwrap(), "llo");
    }

    #[tokio::test]
    async fn error_tail_terminates_stream() {
        let provider = MockAiProvider::new()
            .with_fragments(["Par"])
            .with_error_after(ProviderError::unavailable("boom"));

        let stream = provider.stream_chat(request()).await.unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 2);
        assert!(items[1].is_err());
    }

    #[tokio::test]
    async fn open_error_fails_before_streaming() {
        let provider = MockAiProvider::new().with_open_error(ProviderError::rate_limited(5));
        assert!(provider.stream_chat(request()).await.is_err());
    }

    #[tokio::test]
    async fn records_calls() {
        let provider = MockAiProvider::new().with_fragments(["a"]);
        let _ = provider.stream_chat(request()).await.unwrap();

        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.recorded_requests()[0].messages[0].content, "hi");
    }

    #[tokio::test]
    async fn unscripted_call_uses_default_reply() {
        let provider = MockAiProvider::new();
        let stream = provider.stream_chat(request()).await.unwrap();
        let items: Vec<_> = stream.collect().await;

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "Mock reply");
    }
}
