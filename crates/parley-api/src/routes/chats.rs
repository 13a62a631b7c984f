use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use parley_core::chat::ChatQuery;
use parley_core::AppState;
use parley_models::chat::{Chat, ChatPatch, NewChat, SentMessage};
use parley_models::gateway::SendMessagePayload;
use parley_util::pagination::Paginated;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Default, Deserialize)]
pub struct ListChatsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Comma separated user ids that must all be in the chat.
    pub participants: Option<String>,
    pub chat_name: Option<String>,
    pub is_group: Option<bool>,
    pub recipient_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    #[serde(default, with = "parley_models::id::vec")]
    pub participants: Vec<i64>,
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: bool,
    pub recipient_key: Option<String>,
}

fn parse_id_list(raw: &str) -> Result<Vec<i64>, ApiError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| ApiError::BadRequest(format!("participants: invalid id {s:?}")))
        })
        .collect()
}

fn ensure_participant(chat: &Chat, user_id: i64) -> Result<(), ApiError> {
    if chat.has_participant(user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

pub async fn list_my_chats(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<ListChatsQuery>,
) -> Result<Json<Paginated<Chat>>, ApiError> {
    let participants = match query.participants.as_deref() {
        Some(raw) => parse_id_list(raw)?,
        None => Vec::new(),
    };
    let query = ChatQuery {
        page: query.page,
        limit: query.limit,
        participants,
        chat_name: query.chat_name,
        is_group: query.is_group,
        recipient_key: query.recipient_key,
    };
    Ok(Json(state.chats().find_my_chats(query, auth.user_id).await?))
}

pub async fn create_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateChatRequest>,
) -> Result<(StatusCode, Json<Chat>), ApiError> {
    let mut participants = vec![auth.user_id];
    participants.extend(body.participants);
    let chat = state
        .chats()
        .create(NewChat {
            participants,
            recipient_key: body.recipient_key,
            is_group: body.is_group,
            chat_name: body.chat_name,
        })
        .await?;
    tracing::info!(chat_id = chat.id, user_id = auth.user_id, "chat created");
    Ok((StatusCode::CREATED, Json(chat)))
}

pub async fn get_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> Result<Json<Chat>, ApiError> {
    let chat = state.chats().find_one(chat_id).await?;
    ensure_participant(&chat, auth.user_id)?;
    Ok(Json(chat))
}

pub async fn update_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
    Json(patch): Json<ChatPatch>,
) -> Result<Json<Chat>, ApiError> {
    let chats = state.chats();
    let chat = chats.find_one(chat_id).await?;
    ensure_participant(&chat, auth.user_id)?;
    Ok(Json(chats.update(chat_id, patch).await?))
}

pub async fn delete_chat(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(chat_id): Path<i64>,
) -> Result<Json<Chat>, ApiError> {
    let chats = state.chats();
    let chat = chats.find_one(chat_id).await?;
    ensure_participant(&chat, auth.user_id)?;
    let deleted = chats.destroy(chat_id).await?;
    tracing::info!(chat_id, user_id = auth.user_id, "chat deleted");
    Ok(Json(deleted))
}

/// Same resolve-store-route path as the gateway, without a sending socket.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(payload): Json<SendMessagePayload>,
) -> Result<(StatusCode, Json<SentMessage>), ApiError> {
    let (sent, report) = state.send_message(payload, auth.user_id, None).await?;
    tracing::debug!(
        chat_id = sent.chat.id,
        message_id = sent.message.id,
        broadcast = report.broadcast,
        notified = report.notified.len(),
        degraded = report.degraded,
        "message routed"
    );
    Ok((StatusCode::CREATED, Json(sent)))
}
