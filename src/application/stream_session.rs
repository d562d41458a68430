//! StreamSession - the state machine coordinating one streamed reply.
//!
//! A session validates the request, persists the user message, assembles the
//! context window, opens the upstream bridge, and forwards fragments to the
//! transport while accumulating the full reply. On any terminal transition
//! the accumulated reply is persisted exactly once.
//!
//! States: `Init -> Validating -> Streaming -> {Completed, Aborted, Failed}`.
//! The three terminal states are mutually exclusive and entered at most once.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::application::token_bridge::TokenStreamBridge;
use crate::domain::conversation::{ContextAssembler, Message, Role};
use crate::domain::foundation::{ConversationId, UserId};
use crate::ports::{
    AiProvider, ChatRequest, ConversationStore, OutputTransport, ProviderError, StoreError,
    TransportErrorKind,
};

/// Default defensive cap on one session's wall-clock lifetime.
pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(120);

/// Input for one streaming session.
#[derive(Debug, Clone)]
pub struct StreamRequest {
    /// The conversation to append to.
    pub conversation_id: ConversationId,
    /// The caller; must own the conversation.
    pub user_id: UserId,
    /// The user's message content.
    pub content: String,
}

impl StreamRequest {
    /// Creates a new stream request.
    pub fn new(
        conversation_id: ConversationId,
        user_id: UserId,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id,
            user_id,
            content: content.into(),
        }
    }

    /// Rejects requests that must not start a session at all.
    ///
    /// Nothing is persisted and no transport event is emitted for these.
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.content.trim().is_empty() {
            return Err(SessionError::Validation("message content cannot be empty"));
        }
        Ok(())
    }
}

/// Session lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not yet started.
    Init,
    /// Checking the conversation exists and the caller owns it.
    Validating,
    /// Forwarding fragments from the bridge to the transport.
    Streaming,
    /// Upstream exhausted normally; end marker emitted.
    Completed,
    /// Cancellation observed; peer is gone, nothing further emitted.
    Aborted,
    /// Validation, upstream, or persistence failure; one error event emitted.
    Failed,
}

/// Errors terminating a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Missing or empty required input; rejected before the session starts.
    #[error("validation error: {0}")]
    Validation(&'static str),

    /// Referenced conversation does not exist.
    #[error("conversation {0} not found")]
    NotFound(ConversationId),

    /// Caller does not own the conversation.
    #[error("caller does not own this conversation")]
    Forbidden,

    /// Upstream provider failure while opening or consuming the stream.
    #[error("upstream provider error: {0}")]
    Upstream(#[from] ProviderError),

    /// Store failure other than a missing conversation.
    #[error("store error: {0}")]
    Store(StoreError),

    /// The defensive end-to-end session timeout expired.
    #[error("session timed out")]
    TimedOut,
}

impl From<StoreError> for SessionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => SessionError::NotFound(id),
            other => SessionError::Store(other),
        }
    }
}

impl SessionError {
    /// Maps this error to the generic category delivered to the peer.
    pub fn transport_kind(&self) -> TransportErrorKind {
        match self {
            SessionError::NotFound(_) => TransportErrorKind::NotFound,
            SessionError::Forbidden => TransportErrorKind::Forbidden,
            SessionError::Upstream(_) => TransportErrorKind::Upstream,
            SessionError::Validation(_) | SessionError::Store(_) | SessionError::TimedOut => {
                TransportErrorKind::Internal
            }
        }
    }
}

/// How a session ended, with the persisted reply if any.
#[derive(Debug)]
pub enum SessionOutcome {
    /// Upstream exhausted with no error.
    Completed {
        /// The persisted assistant message (None for an empty reply).
        reply: Option<Message>,
    },
    /// Cancellation observed at a fragment boundary.
    Aborted {
        /// The persisted partial reply (None if nothing was generated).
        reply: Option<Message>,
    },
    /// Validation, upstream, or persistence failure.
    Failed {
        /// What went wrong.
        error: SessionError,
        /// The persisted partial reply, when generation got that far.
        reply: Option<Message>,
    },
}

impl SessionOutcome {
    /// The terminal state this outcome corresponds to.
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Completed { .. } => SessionState::Completed,
            SessionOutcome::Aborted { .. } => SessionState::Aborted,
            SessionOutcome::Failed { .. } => SessionState::Failed,
        }
    }

    /// The assistant message persisted by this session, if any.
    pub fn reply(&self) -> Option<&Message> {
        match self {
            SessionOutcome::Completed { reply }
            | SessionOutcome::Aborted { reply }
            | SessionOutcome::Failed { reply, .. } => reply.as_ref(),
        }
    }
}

/// Single-shot persistence guard for a session's exit.
///
/// Consuming `self` is the only way to run the append, so the reply cannot
/// be persisted twice no matter which terminal transition fires or how a
/// late cancellation races a natural completion.
struct ReplyFinalizer<'a, S: ConversationStore + ?Sized> {
    store: &'a S,
    conversation_id: ConversationId,
}

impl<'a, S: ConversationStore + ?Sized> ReplyFinalizer<'a, S> {
    fn new(store: &'a S, conversation_id: ConversationId) -> Self {
        Self {
            store,
            conversation_id,
        }
    }

    /// Persists the accumulated reply if non-empty. Runs at most once.
    async fn persist(self, buffer: String) -> Result<Option<Message>, StoreError> {
        if buffer.is_empty() {
            return Ok(None);
        }
        self.store
            .append_message(&self.conversation_id, Role::Assistant, &buffer)
            .await
            .map(Some)
    }
}

/// Why the streaming loop stopped.
enum StreamExit {
    /// Upstream exhausted with no error.
    Exhausted,
    /// Cancellation token fired.
    Cancelled,
    /// Upstream yielded its terminal error.
    Upstream(ProviderError),
    /// The defensive session deadline expired.
    TimedOut,
}

/// One request's end-to-end lifecycle from validation through terminal
/// persistence.
///
/// Sessions are independent units of work: they share nothing mutable
/// except the store, and one session stalling or failing never affects
/// another.
pub struct StreamSession<S, P, T>
where
    S: ConversationStore + ?Sized,
    P: AiProvider + ?Sized,
    T: OutputTransport,
{
    store: Arc<S>,
    provider: Arc<P>,
    transport: T,
    assembler: ContextAssembler,
    cancel: CancellationToken,
    timeout: Duration,
}

impl<S, P, T> StreamSession<S, P, T>
where
    S: ConversationStore + ?Sized,
    P: AiProvider + ?Sized,
    T: OutputTransport,
{
    /// Creates a session over shared collaborators.
    ///
    /// `cancel` is the one-shot signal the transport trips when the peer
    /// disconnects; it is observed at every fragment boundary.
    pub fn new(
        store: Arc<S>,
        provider: Arc<P>,
        transport: T,
        assembler: ContextAssembler,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            store,
            provider,
            transport,
            assembler,
            cancel,
            timeout: DEFAULT_SESSION_TIMEOUT,
        }
    }

    /// Overrides the defensive end-to-end timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs the session to its terminal state.
    ///
    /// Consumes the session; a terminal state is entered exactly once and
    /// the accumulated reply is persisted exactly once on every exit path.
    pub async fn run(self, request: StreamRequest) -> SessionOutcome {
        if let Err(error) = request.validate() {
            // Rejected before the session starts: no state mutated, no event.
            return SessionOutcome::Failed { error, reply: None };
        }

        let mut state = SessionState::Init;
        let conversation_id = request.conversation_id;
        tracing::trace!(conversation_id = %conversation_id, ?state, "session constructed");

        state = SessionState::Validating;
        tracing::debug!(conversation_id = %conversation_id, ?state, "session started");

        let detail = match self.store.get_conversation(&conversation_id).await {
            Ok(detail) => detail,
            Err(err) => return self.fail_before_streaming(err.into()).await,
        };

        if !detail.conversation.is_owned_by(&request.user_id) {
            tracing::warn!(
                conversation_id = %conversation_id,
                user_id = %request.user_id,
                "ownership check failed"
            );
            return self.fail_before_streaming(SessionError::Forbidden).await;
        }

        // Durability of the user message precedes any output.
        if let Err(err) = self
            .store
            .append_message(&conversation_id, Role::User, request.content.trim())
            .await
        {
            return self.fail_before_streaming(err.into()).await;
        }

        let history = match self
            .store
            .list_recent_messages(&conversation_id, self.assembler.policy().window_size)
            .await
        {
            Ok(history) => history,
            Err(err) => return self.fail_before_streaming(err.into()).await,
        };

        let window = self.assembler.assemble(&history);
        if window.was_truncated() {
            tracing::debug!(
                conversation_id = %conversation_id,
                truncated = window.truncated_count,
                "context window truncated to fit the character cap"
            );
        }

        let mut bridge =
            match TokenStreamBridge::open(self.provider.as_ref(), ChatRequest::from(&window)).await
            {
                Ok(bridge) => bridge,
                Err(err) => return self.fail_before_streaming(err.into()).await,
            };

        state = SessionState::Streaming;
        tracing::debug!(conversation_id = %conversation_id, ?state, "forwarding fragments");

        let mut buffer = String::new();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        let exit = loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StreamExit::Cancelled,
                _ = &mut deadline => break StreamExit::TimedOut,
                item = bridge.next_fragment() => match item {
                    Some(Ok(fragment)) => {
                        self.transport.emit(&fragment).await;
                        buffer.push_str(&fragment);
                    }
                    Some(Err(err)) => break StreamExit::Upstream(err),
                    None => break StreamExit::Exhausted,
                },
            }
        };

        // Release the upstream request before anything else; on the
        // cancellation and timeout paths the stream is still open.
        bridge.close();

        // Terminal transition. The finalizer is consumed here and nowhere
        // else, so the reply append runs exactly once on every path.
        let finalizer = ReplyFinalizer::new(self.store.as_ref(), conversation_id);
        let (reply, persist_error) = match finalizer.persist(buffer).await {
            Ok(reply) => (reply, None),
            Err(err) => {
                tracing::error!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "failed to persist accumulated reply"
                );
                (None, Some(err))
            }
        };

        let outcome = match (exit, persist_error) {
            (StreamExit::Cancelled, None) => {
                // The peer is already gone: nothing further is emitted.
                SessionOutcome::Aborted { reply }
            }
            (StreamExit::Cancelled, Some(err)) => SessionOutcome::Failed {
                error: err.into(),
                reply: None,
            },
            (StreamExit::Exhausted, None) => {
                self.transport.end().await;
                SessionOutcome::Completed { reply }
            }
            (StreamExit::Exhausted, Some(err)) => {
                let error: SessionError = err.into();
                self.transport.error(error.transport_kind()).await;
                SessionOutcome::Failed { error, reply: None }
            }
            (StreamExit::Upstream(upstream), persisted) => {
                let error = SessionError::Upstream(upstream);
                self.transport.error(error.transport_kind()).await;
                SessionOutcome::Failed {
                    error,
                    reply: if persisted.is_some() { None } else { reply },
                }
            }
            (StreamExit::TimedOut, _) => {
                let error = SessionError::TimedOut;
                self.transport.error(error.transport_kind()).await;
                SessionOutcome::Failed { error, reply }
            }
        };

        tracing::info!(
            conversation_id = %conversation_id,
            state = ?outcome.state(),
            persisted = outcome.reply().is_some(),
            "session finished"
        );
        outcome
    }

    /// Terminal failure before the streaming state: nothing was generated,
    /// nothing is persisted here, and exactly one error event is emitted.
    async fn fail_before_streaming(&self, error: SessionError) -> SessionOutcome {
        tracing::debug!(error = %error, "session failed before streaming");
        self.transport.error(error.transport_kind()).await;
        SessionOutcome::Failed { error, reply: None }
    }
}
