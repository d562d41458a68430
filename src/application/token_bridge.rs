//! Bridge over one upstream generation call.
//!
//! Wraps the provider's fragment stream as a lazy, non-restartable sequence
//! with an explicit close operation. Closing drops the underlying stream,
//! which releases the upstream request, and guarantees no further items are
//! yielded.

use futures::StreamExt;

use crate::ports::{AiProvider, ChatRequest, FragmentStream, ProviderError};

/// Lazy fragment sequence over one upstream generation call.
///
/// The sequence terminates on upstream exhaustion or on the first error;
/// either way the underlying stream is released. Empty fragments are
/// absorbed silently.
pub struct TokenStreamBridge {
    stream: Option<FragmentStream>,
}

impl TokenStreamBridge {
    /// Wraps an already-open fragment stream.
    pub fn new(stream: FragmentStream) -> Self {
        Self {
            stream: Some(stream),
        }
    }

    /// Opens one generation call against the provider.
    pub async fn open<P>(provider: &P, request: ChatRequest) -> Result<Self, ProviderError>
    where
        P: AiProvider + ?Sized,
    {
        let stream = provider.stream_chat(request).await?;
        Ok(Self::new(stream))
    }

    /// Produces the next non-empty fragment.
    ///
    /// Returns `None` once the sequence is finished or the bridge has been
    /// closed. An upstream failure is yielded once as `Some(Err(_))` and
    /// closes the bridge; later calls return `None`.
    pub async fn next_fragment(&mut self) -> Option<Result<String, ProviderError>> {
        let stream = self.stream.as_mut()?;

        loop {
            match stream.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => return Some(Ok(fragment)),
                Some(Err(err)) => {
                    self.close();
                    return Some(Err(err));
                }
                None => {
                    self.close();
                    return None;
                }
            }
        }
    }

    /// Stops fragment production and releases the upstream request.
    ///
    /// Idempotent; no further items are yielded afterwards.
    pub fn close(&mut self) {
        self.stream = None;
    }

    /// Returns true once the bridge no longer holds an upstream stream.
    pub fn is_closed(&self) -> bool {
        self.stream.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    fn bridge_over(items: Vec<Result<String, ProviderError>>) -> TokenStreamBridge {
        TokenStreamBridge::new(Box::pin(stream::iter(items)))
    }

    #[tokio::test]
    async fn yields_fragments_in_order() {
        let mut bridge = bridge_over(vec![Ok("He".into()), Ok("llo".into())]);

        assert_eq!(bridge.next_fragment().await.unwrap().unwrap(), "He");
        assert_eq!(bridge.next_fragment().await.unwrap().unwrap(), "llo");
        assert!(bridge.next_fragment().await.is_none());
        assert!(bridge.is_closed());
    }

    #[tokio::test]
    async fn absorbs_empty_fragments() {
        let mut bridge = bridge_over(vec![Ok("".into()), Ok("Hi".into()), Ok("".into())]);

        assert_eq!(bridge.next_fragment().await.unwrap().unwrap(), "Hi");
        assert!(bridge.next_fragment().await.is_none());
    }

    #[tokio::test]
    async fn error_terminates_the_sequence() {
        let mut bridge = bridge_over(vec![
            Ok("Par".into()),
            Err(ProviderError::unavailable("boom")),
            Ok("never".into()),
        ]);

        assert_eq!(bridge.next_fragment().await.unwrap().unwrap(), "Par");
        assert!(bridge.next_fragment().await.unwrap().is_err());
        // Single typed failure; nothing after it.
        assert!(bridge.next_fragment().await.is_none());
        assert!(bridge.is_closed());
    }

    #[tokio::test]
    async fn close_stops_production() {
        let mut bridge = bridge_over(vec![Ok("a".into()), Ok("b".into())]);

        assert_eq!(bridge.next_fragment().await.unwrap().unwrap(), "a");
        bridge.close();
        assert!(bridge.next_fragment().await.is_none());
        assert!(bridge.is_closed());
    }
}
