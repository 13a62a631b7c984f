use axum::{
    extract::{Path, Query, State},
    Json,
};
use parley_core::message::MessageQuery;
use parley_core::AppState;
use parley_models::message::{Message, MessagePatch};
use parley_util::pagination::Paginated;

use crate::error::ApiError;
use crate::middleware::AuthUser;

async fn ensure_member(state: &AppState, message: &Message, user_id: i64) -> Result<(), ApiError> {
    let chat = state.chats().find_one(message.chat_id).await?;
    if chat.has_participant(user_id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

fn ensure_sender(message: &Message, user_id: i64) -> Result<(), ApiError> {
    if message.sender == user_id {
        Ok(())
    } else {
        Err(ApiError::Forbidden)
    }
}

/// `?chat_id=&message=&page=&limit=`; only chats the caller belongs to.
pub async fn list_messages(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<MessageQuery>,
) -> Result<Json<Paginated<Message>>, ApiError> {
    Ok(Json(state.messages().find_for_user(query, auth.user_id).await?))
}

pub async fn get_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    let message = state.messages().find_one(message_id).await?;
    ensure_member(&state, &message, auth.user_id).await?;
    Ok(Json(message))
}

/// Edits go out to the chat room like gateway edits.
pub async fn update_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
    Json(patch): Json<MessagePatch>,
) -> Result<Json<Message>, ApiError> {
    let message = state.messages().find_one(message_id).await?;
    ensure_sender(&message, auth.user_id)?;
    Ok(Json(state.update_message(message_id, patch).await?))
}

pub async fn delete_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<i64>,
) -> Result<Json<Message>, ApiError> {
    let messages = state.messages();
    let message = messages.find_one(message_id).await?;
    ensure_sender(&message, auth.user_id)?;
    let deleted = messages.destroy(message_id).await?;
    tracing::info!(message_id, user_id = auth.user_id, "message deleted");
    Ok(Json(deleted))
}
