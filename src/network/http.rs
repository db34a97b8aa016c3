use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use super::gateway::Gateway;
use super::identity::{AuthenticatedUser, is_valid_user_id};
use super::presence::PresenceRegistry;
use super::websocket;
use crate::common::{ChatUser, Message, UserId};
use crate::error::{ChatError, ChatResult};
use crate::storage::{MessageStore, UserDirectory};
use crate::sync::ConversationService;

/// Everything the request handlers share.
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub conversations: Arc<ConversationService>,
}

impl AppState {
    pub fn new(store: Arc<dyn MessageStore>, directory: Arc<dyn UserDirectory>) -> Self {
        let presence = Arc::new(PresenceRegistry::new());
        let gateway = Arc::new(Gateway::new(
            Arc::clone(&presence),
            Arc::clone(&store),
            Arc::clone(&directory),
        ));
        let conversations = Arc::new(ConversationService::new(store, directory, presence));
        Self {
            gateway,
            conversations,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ws", get(websocket::upgrade))
        .route("/api/messages", post(post_message))
        .route("/api/messages/users", get(chat_list))
        .route("/api/messages/start", post(start_conversation))
        .route("/api/messages/{user_id}", get(history))
        .route("/api/messages/{user_id}/read", put(mark_read))
        .with_state(state)
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ChatError::Persistence(err) => {
                log::error!("Request failed in storage: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage unavailable".to_string(),
                )
            }
            ChatError::Unauthorized(reason) => (StatusCode::UNAUTHORIZED, reason.clone()),
            ChatError::NotFound(what) => (StatusCode::NOT_FOUND, format!("{what} not found")),
            ChatError::InvalidRequest(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
        };
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewMessage {
    receiver_id: UserId,
    content: String,
}

fn counterpart(raw: String) -> ChatResult<UserId> {
    if is_valid_user_id(&raw) {
        Ok(UserId::new(raw))
    } else {
        Err(ChatError::InvalidRequest(format!("invalid user id `{raw}`")))
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "healthy" }))
}

async fn chat_list(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ChatResult<Json<Vec<ChatUser>>> {
    let users = state.conversations.get_chat_list(&user.id).await?;
    log::debug!("Chat list for {}: {} users", user.id, users.len());
    Ok(Json(users))
}

async fn post_message(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<NewMessage>,
) -> ChatResult<(StatusCode, Json<Message>)> {
    let message = state
        .conversations
        .post_message(&user.id, &body.receiver_id, &body.content)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

async fn start_conversation(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<NewMessage>,
) -> ChatResult<Json<serde_json::Value>> {
    let message = state
        .conversations
        .post_message(&user.id, &body.receiver_id, &body.content)
        .await?;
    Ok(Json(json!({ "success": true, "message": message })))
}

async fn history(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> ChatResult<Json<Vec<Message>>> {
    let counterpart = counterpart(user_id)?;
    let messages = state
        .conversations
        .get_history(&user.id, &counterpart)
        .await?;
    Ok(Json(messages))
}

async fn mark_read(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(user_id): Path<String>,
) -> ChatResult<Json<serde_json::Value>> {
    let counterpart = counterpart(user_id)?;
    let updated = state.conversations.mark_read(&user.id, &counterpart).await?;
    Ok(Json(json!({ "success": true, "updated": updated })))
}
