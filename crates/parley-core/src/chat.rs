use parley_db::chats::{ChatFilter, ChatRow};
use parley_db::DbPool;
use parley_models::chat::{direct_key, Chat, ChatPatch, NewChat, SentMessage};
use parley_models::gateway::SendMessagePayload;
use parley_models::message::NewMessage;
use parley_util::pagination::{paginate, PageParams, Paginated};
use parley_util::validation;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::CoreError;
use crate::message::MessageStore;
use crate::users::UserDirectory;

/// Listing query for [`ChatResolver::find_my_chats`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default, with = "parley_models::id::vec")]
    pub participants: Vec<i64>,
    pub chat_name: Option<String>,
    pub is_group: Option<bool>,
    pub recipient_key: Option<String>,
}

/// Finds or creates the thread a message belongs to.
#[derive(Clone)]
pub struct ChatResolver {
    db: DbPool,
    users: Arc<dyn UserDirectory>,
    messages: MessageStore,
}

impl ChatResolver {
    pub fn new(db: DbPool, users: Arc<dyn UserDirectory>, messages: MessageStore) -> Self {
        Self { db, users, messages }
    }

    /// Looks a thread up by `"{sender}_{recipient}"` or `"{recipient}_{sender}"`.
    /// Without a sender both keys collapse to the bare recipient, which may
    /// also name a group chat by id.
    pub async fn find_for_sending(
        &self,
        recipient: &str,
        sender: Option<i64>,
    ) -> Result<Option<Chat>, CoreError> {
        let (key, reverse_key) = match sender {
            Some(sender) => {
                let sender = sender.to_string();
                (direct_key(&sender, recipient), direct_key(recipient, &sender))
            }
            None => (recipient.to_string(), recipient.to_string()),
        };
        if let Some(row) =
            parley_db::chats::find_chat_by_recipient_keys(&self.db, &key, &reverse_key).await?
        {
            return Ok(Some(to_chat(row)));
        }
        if sender.is_none() {
            if let Ok(chat_id) = recipient.parse::<i64>() {
                let row = parley_db::chats::get_chat(&self.db, chat_id).await?;
                return Ok(row.filter(|row| row.is_group).map(to_chat));
            }
        }
        Ok(None)
    }

    /// Resolves (or creates) the thread for `payload.recipient` and persists
    /// the message in it. Chat creation is not rolled back if the message
    /// write fails; a retry finds the same thread by key.
    pub async fn send_message(
        &self,
        payload: SendMessagePayload,
        sender_id: i64,
    ) -> Result<SentMessage, CoreError> {
        let recipient = payload.recipient.trim().to_string();
        validation::validate_recipient(&recipient)
            .map_err(|e| CoreError::validation("recipient", e))?;
        if let Some(name) = &payload.chat_name {
            validation::validate_chat_name(name)
                .map_err(|e| CoreError::validation("chat_name", e))?;
        }

        let recipient_user = match recipient.parse::<i64>() {
            Ok(id) => self.users.find_by_id(id).await?,
            Err(_) => None,
        };

        let chat = match &recipient_user {
            Some(user) => self.resolve_direct(sender_id, user.id).await?,
            None => self.resolve_group(&recipient, sender_id, &payload).await?,
        };

        let message = self
            .messages
            .create(NewMessage {
                chat_id: chat.id,
                sender: sender_id,
                body: payload.body,
                message_type: payload.message_type,
                reply_for_message: payload.reply_for_message,
                attachments: payload.attachments.unwrap_or_default(),
            })
            .await?;

        tracing::debug!(chat_id = chat.id, message_id = message.id, sender_id, "message stored");
        Ok(SentMessage { chat, message })
    }

    async fn resolve_direct(&self, sender_id: i64, recipient_id: i64) -> Result<Chat, CoreError> {
        let recipient = recipient_id.to_string();
        if let Some(chat) = self.find_for_sending(&recipient, Some(sender_id)).await? {
            return Ok(chat);
        }

        let key = direct_key(&sender_id.to_string(), &recipient);
        let pair = parley_db::chats::direct_pair(sender_id, recipient_id);
        let participants = dedup(vec![sender_id, recipient_id]);
        match parley_db::chats::create_chat(
            &self.db,
            parley_util::snowflake::generate(1),
            &participants,
            Some(&key),
            Some(&pair),
            false,
            None,
        )
        .await
        {
            Ok(row) => {
                tracing::info!(chat_id = row.id, recipient_key = %key, "direct chat created");
                Ok(to_chat(row))
            }
            // Lost a race with a concurrent first message between the same pair.
            Err(err) if err.is_unique_violation() => self
                .find_for_sending(&recipient, Some(sender_id))
                .await?
                .ok_or(CoreError::Storage(err)),
            Err(err) => Err(err.into()),
        }
    }

    async fn resolve_group(
        &self,
        recipient: &str,
        sender_id: i64,
        payload: &SendMessagePayload,
    ) -> Result<Chat, CoreError> {
        if let Some(chat) = self.find_for_sending(recipient, None).await? {
            return Ok(chat);
        }

        let mut participants = vec![sender_id];
        participants.extend(payload.participants.iter().flatten().copied());
        let participants = dedup(participants);
        validation::validate_participant_count(participants.len())
            .map_err(|e| CoreError::validation("participants", e))?;

        match parley_db::chats::create_chat(
            &self.db,
            parley_util::snowflake::generate(1),
            &participants,
            Some(recipient),
            None,
            true,
            payload.chat_name.as_deref(),
        )
        .await
        {
            Ok(row) => {
                tracing::info!(chat_id = row.id, recipient_key = recipient, "group chat created");
                Ok(to_chat(row))
            }
            Err(err) if err.is_unique_violation() => self
                .find_for_sending(recipient, None)
                .await?
                .ok_or(CoreError::Storage(err)),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create(&self, input: NewChat) -> Result<Chat, CoreError> {
        let participants = dedup(input.participants);
        if participants.is_empty() {
            return Err(CoreError::ValidationFailed(
                "participants: at least one participant is required".into(),
            ));
        }
        validation::validate_participant_count(participants.len())
            .map_err(|e| CoreError::validation("participants", e))?;
        if let Some(name) = &input.chat_name {
            validation::validate_chat_name(name)
                .map_err(|e| CoreError::validation("chat_name", e))?;
        }

        let row = parley_db::chats::create_chat(
            &self.db,
            parley_util::snowflake::generate(1),
            &participants,
            input.recipient_key.as_deref(),
            None,
            input.is_group,
            input.chat_name.as_deref(),
        )
        .await
        .map_err(|err| {
            if err.is_unique_violation() {
                CoreError::ValidationFailed(
                    "recipient_key: a chat with this key already exists".into(),
                )
            } else {
                err.into()
            }
        })?;
        Ok(to_chat(row))
    }

    pub async fn find_one(&self, id: i64) -> Result<Chat, CoreError> {
        parley_db::chats::get_chat(&self.db, id)
            .await?
            .map(to_chat)
            .ok_or(CoreError::NotFound("chat"))
    }

    pub async fn update(&self, id: i64, patch: ChatPatch) -> Result<Chat, CoreError> {
        if let Some(name) = &patch.chat_name {
            validation::validate_chat_name(name)
                .map_err(|e| CoreError::validation("chat_name", e))?;
        }
        let participants = patch.participants.map(dedup);
        if let Some(list) = &participants {
            if list.is_empty() {
                return Err(CoreError::ValidationFailed(
                    "participants: at least one participant is required".into(),
                ));
            }
            validation::validate_participant_count(list.len())
                .map_err(|e| CoreError::validation("participants", e))?;
        }
        parley_db::chats::update_chat(
            &self.db,
            id,
            patch.chat_name.as_deref(),
            patch.is_group,
            participants.as_deref(),
        )
        .await?
        .map(to_chat)
        .ok_or(CoreError::NotFound("chat"))
    }

    /// Deletes the chat (and its messages) and returns it as it was.
    pub async fn destroy(&self, id: i64) -> Result<Chat, CoreError> {
        parley_db::chats::delete_chat(&self.db, id)
            .await?
            .map(to_chat)
            .ok_or(CoreError::NotFound("chat"))
    }

    /// Chats containing the requesting user and every listed participant.
    /// Unlike message listing, an empty result is `NotFound`.
    pub async fn find_my_chats(
        &self,
        query: ChatQuery,
        user_id: i64,
    ) -> Result<Paginated<Chat>, CoreError> {
        let params = PageParams::new(query.page, query.limit);
        let mut participants = query.participants;
        participants.push(user_id);
        let filter = ChatFilter {
            participants,
            chat_name: query.chat_name.filter(|s| !s.is_empty()),
            is_group: query.is_group,
            recipient_key: query.recipient_key.filter(|s| !s.is_empty()),
        };
        let (rows, total) = parley_db::chats::list_chats(
            &self.db,
            &filter,
            params.limit() as i64,
            params.offset(),
        )
        .await?;
        if rows.is_empty() {
            return Err(CoreError::NotFound("chat record"));
        }
        let list = rows.into_iter().map(to_chat).collect();
        Ok(paginate(list, total.max(0) as u64, params.page(), params.limit()))
    }
}

fn dedup(ids: Vec<i64>) -> Vec<i64> {
    let mut seen = std::collections::HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

fn to_chat(row: ChatRow) -> Chat {
    Chat {
        id: row.id,
        participants: row.participants,
        is_group: row.is_group,
        chat_name: row.chat_name,
        recipient_key: row.recipient_key,
        created_at: row.created_at,
        updated_at: row.updated_at,
    }
}
