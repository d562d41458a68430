//! End-to-end tests for the streaming reply pipeline.
//!
//! Drives StreamSession against the in-memory store, the mock provider, and
//! the channel transport, covering every termination path and the
//! exactly-once persistence guarantee.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use tidechat::adapters::ai::MockAiProvider;
use tidechat::adapters::http::{ChannelTransport, TransportEvent};
use tidechat::adapters::memory::InMemoryConversationStore;
use tidechat::application::{SessionError, SessionOutcome, StreamRequest, StreamSession};
use tidechat::domain::conversation::{ContextAssembler, ContextPolicy, Role};
use tidechat::domain::foundation::{ConversationId, UserId};
use tidechat::ports::{ConversationStore, ProviderError, TransportErrorKind};

fn owner() -> UserId {
    UserId::new("user-1").unwrap()
}

fn assembler() -> ContextAssembler {
    ContextAssembler::new(ContextPolicy::new("You are a helpful assistant."))
}

fn session(
    store: &Arc<InMemoryConversationStore>,
    provider: &Arc<MockAiProvider>,
    transport: ChannelTransport,
    cancel: CancellationToken,
) -> StreamSession<InMemoryConversationStore, MockAiProvider, ChannelTransport> {
    StreamSession::new(
        Arc::clone(store),
        Arc::clone(provider),
        transport,
        assembler(),
        cancel,
    )
}

async fn assistant_messages(
    store: &InMemoryConversationStore,
    conversation_id: &ConversationId,
) -> Vec<String> {
    store
        .get_conversation(conversation_id)
        .await
        .unwrap()
        .messages
        .iter()
        .filter(|m| m.role() == Role::Assistant)
        .map(|m| m.content().to_string())
        .collect()
}

#[tokio::test]
async fn completed_stream_persists_full_reply_and_orders_the_log() {
    // Upstream yields ["He", "llo"] then ends.
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(MockAiProvider::new().with_fragments(["He", "llo"]));
    let conversation = store.create_conversation(&owner()).await.unwrap();

    let (transport, mut events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .run(StreamRequest::new(*conversation.id(), owner(), "hi"))
        .await;

    assert!(matches!(outcome, SessionOutcome::Completed { reply: Some(_) }));
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Fragment("He".into())
    );
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Fragment("llo".into())
    );
    assert_eq!(events.recv().await.unwrap(), TransportEvent::End);

    let detail = store.get_conversation(conversation.id()).await.unwrap();
    let log: Vec<_> = detail
        .messages
        .iter()
        .map(|m| (m.role(), m.content().to_string()))
        .collect();
    assert_eq!(
        log,
        vec![
            (Role::User, "hi".to_string()),
            (Role::Assistant, "Hello".to_string()),
        ]
    );
}

#[tokio::test]
async fn peer_disconnect_persists_partial_reply_and_forwards_nothing_more() {
    // Upstream would keep streaming; the peer disconnects after "Par", "t".
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(
        MockAiProvider::new()
            .with_fragments(["Par", "t"])
            .with_stall_after_fragments(),
    );
    let conversation = store.create_conversation(&owner()).await.unwrap();

    let cancel = CancellationToken::new();
    let (transport, mut events) = ChannelTransport::with_cancel(32, cancel.clone());

    let handle = tokio::spawn(
        session(&store, &provider, transport, cancel.clone())
            .run(StreamRequest::new(*conversation.id(), owner(), "hi")),
    );

    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Fragment("Par".into())
    );
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Fragment("t".into())
    );
    cancel.cancel();

    let outcome = handle.await.unwrap();
    assert!(matches!(outcome, SessionOutcome::Aborted { reply: Some(_) }));

    // Aborted sessions emit nothing further; the channel just closes.
    assert!(events.recv().await.is_none());
    assert_eq!(
        assistant_messages(&store, conversation.id()).await,
        vec!["Part".to_string()]
    );
}

#[tokio::test]
async fn unknown_conversation_fails_with_not_found_and_writes_nothing() {
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(MockAiProvider::new().with_fragments(["unused"]));

    let (transport, mut events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .run(StreamRequest::new(ConversationId::new(), owner(), "hi"))
        .await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            error: SessionError::NotFound(_),
            reply: None,
        }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Error(TransportErrorKind::NotFound)
    );
    assert!(events.recv().await.is_none());
    assert_eq!(store.message_count().await, 0);
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn context_window_holds_system_preamble_plus_ten_most_recent() {
    // 15 prior messages; the upstream request must carry the system
    // instruction plus the 10 most recent entries, chronological.
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(MockAiProvider::new().with_fragments(["ok"]));
    let conversation = store.create_conversation(&owner()).await.unwrap();

    for i in 0..15 {
        let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
        store
            .append_message(conversation.id(), role, &format!("m{}", i))
            .await
            .unwrap();
    }

    let (transport, _events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .run(StreamRequest::new(*conversation.id(), owner(), "newest"))
        .await;
    assert!(matches!(outcome, SessionOutcome::Completed { .. }));

    let requests = provider.recorded_requests();
    assert_eq!(requests.len(), 1);
    let messages = &requests[0].messages;

    assert_eq!(messages.len(), 11);
    assert_eq!(messages[0].role, tidechat::ports::ChatRole::System);
    // The 10 most recent stored messages: m6..m14 plus the new user message.
    assert_eq!(messages[1].content, "m6");
    assert_eq!(messages[10].content, "newest");
}

#[tokio::test]
async fn upstream_error_persists_partial_reply_and_emits_one_error_event() {
    // Upstream yields "Par" then fails.
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(
        MockAiProvider::new()
            .with_fragments(["Par"])
            .with_error_after(ProviderError::unavailable("overloaded")),
    );
    let conversation = store.create_conversation(&owner()).await.unwrap();

    let (transport, mut events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .run(StreamRequest::new(*conversation.id(), owner(), "hi"))
        .await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            error: SessionError::Upstream(_),
            reply: Some(_),
        }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Fragment("Par".into())
    );
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Error(TransportErrorKind::Upstream)
    );
    assert!(events.recv().await.is_none());

    assert_eq!(
        assistant_messages(&store, conversation.id()).await,
        vec!["Par".to_string()]
    );
}

#[tokio::test]
async fn empty_reply_persists_nothing_but_still_completes() {
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(MockAiProvider::new().with_fragments(Vec::<String>::new()));
    let conversation = store.create_conversation(&owner()).await.unwrap();

    let (transport, mut events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .run(StreamRequest::new(*conversation.id(), owner(), "hi"))
        .await;

    assert!(matches!(outcome, SessionOutcome::Completed { reply: None }));
    assert_eq!(events.recv().await.unwrap(), TransportEvent::End);
    assert!(assistant_messages(&store, conversation.id()).await.is_empty());
}

#[tokio::test]
async fn every_termination_path_persists_the_reply_at_most_once() {
    // Completion, upstream failure, and cancellation each append zero or
    // one assistant message, never more.
    let store = Arc::new(InMemoryConversationStore::new());

    for scripted in 0..3 {
        let conversation = store.create_conversation(&owner()).await.unwrap();
        let cancel = CancellationToken::new();
        let provider = match scripted {
            0 => Arc::new(MockAiProvider::new().with_fragments(["done"])),
            1 => Arc::new(
                MockAiProvider::new()
                    .with_fragments(["half"])
                    .with_error_after(ProviderError::network("reset")),
            ),
            _ => {
                cancel.cancel();
                Arc::new(MockAiProvider::new().with_fragments(["never"]))
            }
        };

        let (transport, _events) = ChannelTransport::new(32);
        let _ = session(&store, &provider, transport, cancel)
            .run(StreamRequest::new(*conversation.id(), owner(), "hi"))
            .await;

        let count = assistant_messages(&store, conversation.id()).await.len();
        assert!(count <= 1, "path {} persisted {} replies", scripted, count);
    }
}

#[tokio::test]
async fn sessions_on_different_conversations_run_independently() {
    let store = Arc::new(InMemoryConversationStore::new());
    let conversation_a = store.create_conversation(&owner()).await.unwrap();
    let conversation_b = store.create_conversation(&owner()).await.unwrap();

    // One session stalls until cancelled; the other completes normally.
    let stalling = Arc::new(
        MockAiProvider::new()
            .with_fragments(["slow"])
            .with_stall_after_fragments(),
    );
    let quick = Arc::new(MockAiProvider::new().with_fragments(["fast"]));

    let cancel_a = CancellationToken::new();
    let (transport_a, mut events_a) = ChannelTransport::with_cancel(32, cancel_a.clone());
    let handle_a = tokio::spawn(
        session(&store, &stalling, transport_a, cancel_a.clone())
            .run(StreamRequest::new(*conversation_a.id(), owner(), "hi")),
    );

    let (transport_b, _events_b) = ChannelTransport::new(32);
    let outcome_b = session(&store, &quick, transport_b, CancellationToken::new())
        .run(StreamRequest::new(*conversation_b.id(), owner(), "hi"))
        .await;

    // B finished while A is still streaming.
    assert!(matches!(outcome_b, SessionOutcome::Completed { .. }));
    assert_eq!(
        assistant_messages(&store, conversation_b.id()).await,
        vec!["fast".to_string()]
    );

    assert_eq!(
        events_a.recv().await.unwrap(),
        TransportEvent::Fragment("slow".into())
    );
    cancel_a.cancel();
    let outcome_a = handle_a.await.unwrap();
    assert!(matches!(outcome_a, SessionOutcome::Aborted { .. }));
}

#[tokio::test]
async fn stream_open_failure_emits_one_error_and_persists_only_the_user_message() {
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(MockAiProvider::new().with_open_error(ProviderError::rate_limited(9)));
    let conversation = store.create_conversation(&owner()).await.unwrap();

    let (transport, mut events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .run(StreamRequest::new(*conversation.id(), owner(), "hi"))
        .await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            error: SessionError::Upstream(_),
            reply: None,
        }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Error(TransportErrorKind::Upstream)
    );

    // The user message was durably appended before the stream was opened.
    let detail = store.get_conversation(conversation.id()).await.unwrap();
    assert_eq!(detail.messages.len(), 1);
    assert_eq!(detail.messages[0].role(), Role::User);
}

#[tokio::test]
async fn stalled_upstream_is_cut_off_by_the_session_timeout() {
    let store = Arc::new(InMemoryConversationStore::new());
    let provider = Arc::new(
        MockAiProvider::new()
            .with_fragments(["Par"])
            .with_stall_after_fragments(),
    );
    let conversation = store.create_conversation(&owner()).await.unwrap();

    let (transport, mut events) = ChannelTransport::new(32);
    let outcome = session(&store, &provider, transport, CancellationToken::new())
        .with_timeout(Duration::from_millis(50))
        .run(StreamRequest::new(*conversation.id(), owner(), "hi"))
        .await;

    assert!(matches!(
        outcome,
        SessionOutcome::Failed {
            error: SessionError::TimedOut,
            ..
        }
    ));
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Fragment("Par".into())
    );
    assert_eq!(
        events.recv().await.unwrap(),
        TransportEvent::Error(TransportErrorKind::Internal)
    );
    assert_eq!(
        assistant_messages(&store, conversation.id()).await,
        vec!["Par".to_string()]
    );
}
