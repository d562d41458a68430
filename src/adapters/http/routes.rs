//! Chat HTTP routes.
//!
//! Thin adapter over the application handlers and the stream session.
//! Identity validation happens upstream; these handlers consume the caller's
//! user id through the request.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;

use crate::application::handlers::{
    CreateConversationCommand, CreateConversationHandler, GetConversationError,
    GetConversationHandler, GetConversationQuery,
};
use crate::application::{StreamRequest, StreamSession};
use crate::domain::conversation::ContextAssembler;
use crate::domain::foundation::{ConversationId, UserId};
use crate::ports::{AiProvider, ConversationStore};

use super::dto::{
    ApiEnvelope, ConversationDetailQuery, ConversationView, CreateConversationBody,
    StreamMessageBody,
};
use super::sse::sse_response;
use super::transport::ChannelTransport;

/// Buffered transport events per in-flight session.
const TRANSPORT_BUFFER: usize = 32;

/// Shared state for the chat routes.
#[derive(Clone)]
pub struct AppState {
    /// The conversation log.
    pub store: Arc<dyn ConversationStore>,
    /// The upstream generation client, built once at startup.
    pub provider: Arc<dyn AiProvider>,
    /// Context windowing policy.
    pub assembler: ContextAssembler,
    /// Defensive cap on one session's lifetime.
    pub session_timeout: Duration,
}

/// Builds the chat router.
pub fn chat_router() -> Router<AppState> {
    Router::new()
        .route(
            "/chat/conversation",
            post(create_conversation).get(conversation_detail),
        )
        .route("/chat/stream", post(stream_message))
}

/// `POST /chat/conversation` - open a new conversation.
async fn create_conversation(
    State(state): State<AppState>,
    Json(body): Json<CreateConversationBody>,
) -> Result<Json<ApiEnvelope<String>>, ApiError> {
    let user_id = UserId::new(body.user_id).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let handler = CreateConversationHandler::new(Arc::clone(&state.store));
    let conversation = handler
        .handle(CreateConversationCommand { user_id })
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    Ok(Json(ApiEnvelope::ok(conversation.id().to_string())))
}

/// `GET /chat/conversation` - conversation detail with ordered messages.
async fn conversation_detail(
    State(state): State<AppState>,
    Query(query): Query<ConversationDetailQuery>,
) -> Result<Json<ApiEnvelope<ConversationView>>, ApiError> {
    let user_id = UserId::new(query.user_id).map_err(|e| ApiError::bad_request(e.to_string()))?;
    let conversation_id: ConversationId = query
        .id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid conversation id"))?;

    let handler = GetConversationHandler::new(Arc::clone(&state.store));
    let detail = handler
        .handle(GetConversationQuery {
            user_id,
            conversation_id,
        })
        .await?;

    Ok(Json(ApiEnvelope::ok(ConversationView::from_detail(&detail))))
}

/// `POST /chat/stream` - stream an AI reply over SSE.
///
/// Missing input is rejected with a 400 before any session starts. Once the
/// SSE response begins, failures surface as `error` events on the stream.
async fn stream_message(
    State(state): State<AppState>,
    Json(body): Json<StreamMessageBody>,
) -> Result<Response, ApiError> {
    let (Some(conversation_id), Some(message)) = (body.conversation_id, body.message) else {
        return Err(ApiError::bad_request("Missing conversationId or message"));
    };

    let conversation_id: ConversationId = conversation_id
        .parse()
        .map_err(|_| ApiError::bad_request("invalid conversation id"))?;
    let user_id = UserId::new(body.user_id).map_err(|e| ApiError::bad_request(e.to_string()))?;

    let request = StreamRequest::new(conversation_id, user_id, message);
    request
        .validate()
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    let cancel = CancellationToken::new();
    let (transport, rx) = ChannelTransport::with_cancel(TRANSPORT_BUFFER, cancel.clone());

    let session = StreamSession::new(
        Arc::clone(&state.store),
        Arc::clone(&state.provider),
        transport,
        state.assembler.clone(),
        cancel.clone(),
    )
    .with_timeout(state.session_timeout);

    // The session runs to its terminal state on its own task; client
    // disconnects reach it through the cancellation token.
    tokio::spawn(session.run(request));

    Ok(sse_response(rx, cancel).into_response())
}

/// Error responses for the non-streaming endpoints.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!(error = %message, "request failed");
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: "Internal Server Error".to_string(),
        }
    }
}

impl From<GetConversationError> for ApiError {
    fn from(err: GetConversationError) -> Self {
        match err {
            GetConversationError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                message: "Conversation not found".to_string(),
            },
            GetConversationError::Forbidden => Self {
                status: StatusCode::FORBIDDEN,
                message: "Forbidden".to_string(),
            },
            GetConversationError::Store(e) => Self::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "code": self.status.as_u16(),
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_error_maps_get_conversation_errors() {
        let err: ApiError = GetConversationError::NotFound(ConversationId::new()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: ApiError = GetConversationError::Forbidden.into();
        assert_eq!(err.status, StatusCode::FORBIDDEN);
    }

    #[test]
    fn bad_request_keeps_message() {
        let err = ApiError::bad_request("Missing conversationId or message");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Missing conversationId or message");
    }
}
