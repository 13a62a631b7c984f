use chrono::Utc;
use parley_db::messages::{MessageFilter, MessageRow, ReceiptRow};
use parley_db::{DbError, DbPool};
use parley_models::message::{Message, MessagePatch, MessageType, NewMessage, Receipt, ReceiptKind};
use parley_util::pagination::{paginate, PageParams, Paginated};
use parley_util::validation;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::CoreError;

/// Listing query for [`MessageStore::find_for_user`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default, with = "parley_models::id::option")]
    pub chat_id: Option<i64>,
    /// Case-insensitive substring of the body.
    pub message: Option<String>,
}

/// Message persistence plus delivered/read bookkeeping.
#[derive(Clone)]
pub struct MessageStore {
    db: DbPool,
}

impl MessageStore {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }

    pub async fn create(&self, input: NewMessage) -> Result<Message, CoreError> {
        validation::validate_message_body(&input.body)
            .map_err(|e| CoreError::validation("body", e))?;
        validation::validate_attachments(&input.attachments)
            .map_err(|e| CoreError::validation("attachments", e))?;

        if let Some(reply_id) = input.reply_for_message {
            let target = parley_db::messages::get_message(&self.db, reply_id).await?;
            match target {
                Some(target) if target.chat_id == input.chat_id => {}
                Some(_) => {
                    return Err(CoreError::ValidationFailed(
                        "reply_for_message: must reference a message in the same chat".into(),
                    ))
                }
                None => {
                    return Err(CoreError::ValidationFailed(
                        "reply_for_message: referenced message does not exist".into(),
                    ))
                }
            }
        }

        let id = parley_util::snowflake::generate(1);
        let row = parley_db::messages::create_message(
            &self.db,
            id,
            input.chat_id,
            input.sender,
            &input.body,
            input.message_type.as_str(),
            input.reply_for_message,
            &input.attachments,
        )
        .await?;
        to_message(row, Vec::new())
    }

    pub async fn find_one(&self, id: i64) -> Result<Message, CoreError> {
        let row = parley_db::messages::get_message(&self.db, id)
            .await?
            .ok_or(CoreError::NotFound("message"))?;
        Ok(self.hydrate(vec![row]).await?.remove(0))
    }

    pub async fn update(&self, id: i64, patch: MessagePatch) -> Result<Message, CoreError> {
        if let Some(body) = &patch.body {
            validation::validate_message_body(body).map_err(|e| CoreError::validation("body", e))?;
        }
        if let Some(attachments) = &patch.attachments {
            validation::validate_attachments(attachments)
                .map_err(|e| CoreError::validation("attachments", e))?;
        }
        let row = parley_db::messages::update_message(
            &self.db,
            id,
            patch.body.as_deref(),
            patch.message_type.map(MessageType::as_str),
            patch.attachments.as_deref(),
        )
        .await?
        .ok_or(CoreError::NotFound("message"))?;
        Ok(self.hydrate(vec![row]).await?.remove(0))
    }

    /// Appends one delivered entry per recipient. Duplicates are kept.
    pub async fn append_delivered(&self, id: i64, recipient_ids: &[i64]) -> Result<u64, CoreError> {
        self.append(id, ReceiptKind::Delivered, recipient_ids).await
    }

    /// Appends one read entry per recipient. Duplicates are kept.
    pub async fn append_read(&self, id: i64, recipient_ids: &[i64]) -> Result<u64, CoreError> {
        self.append(id, ReceiptKind::Read, recipient_ids).await
    }

    async fn append(
        &self,
        id: i64,
        kind: ReceiptKind,
        recipient_ids: &[i64],
    ) -> Result<u64, CoreError> {
        parley_db::messages::append_receipts(&self.db, id, kind.as_str(), recipient_ids, Utc::now())
            .await
            .map_err(|err| match err {
                DbError::NotFound => CoreError::NotFound("message"),
                other => CoreError::Storage(other),
            })
    }

    /// Messages from chats the user participates in. An empty match is an
    /// empty page.
    pub async fn find_for_user(
        &self,
        query: MessageQuery,
        user_id: i64,
    ) -> Result<Paginated<Message>, CoreError> {
        let params = PageParams::new(query.page, query.limit);
        let filter = MessageFilter {
            chat_id: query.chat_id,
            body_contains: query.message.filter(|m| !m.is_empty()),
        };
        let (rows, total) = parley_db::messages::list_messages_for_user(
            &self.db,
            user_id,
            &filter,
            params.limit() as i64,
            params.offset(),
        )
        .await?;
        let list = self.hydrate(rows).await?;
        Ok(paginate(list, total.max(0) as u64, params.page(), params.limit()))
    }

    /// Deletes the message and returns it as it was.
    pub async fn destroy(&self, id: i64) -> Result<Message, CoreError> {
        let receipts = parley_db::messages::get_receipts(&self.db, &[id]).await?;
        let row = parley_db::messages::delete_message(&self.db, id)
            .await?
            .ok_or(CoreError::NotFound("message"))?;
        to_message(row, receipts)
    }

    async fn hydrate(&self, rows: Vec<MessageRow>) -> Result<Vec<Message>, CoreError> {
        let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
        let mut by_message: HashMap<i64, Vec<ReceiptRow>> = HashMap::new();
        for receipt in parley_db::messages::get_receipts(&self.db, &ids).await? {
            by_message.entry(receipt.message_id).or_default().push(receipt);
        }
        rows.into_iter()
            .map(|row| {
                let receipts = by_message.remove(&row.id).unwrap_or_default();
                to_message(row, receipts)
            })
            .collect()
    }
}

fn to_message(row: MessageRow, receipts: Vec<ReceiptRow>) -> Result<Message, CoreError> {
    let message_type = row
        .message_type
        .parse::<MessageType>()
        .map_err(CoreError::Internal)?;
    let mut delivereds = Vec::new();
    let mut reads = Vec::new();
    for receipt in receipts {
        let entry = Receipt {
            by: receipt.recipient_id,
            time: receipt.created_at,
        };
        match receipt.kind.as_str() {
            "delivered" => delivereds.push(entry),
            "read" => reads.push(entry),
            other => {
                tracing::warn!(message_id = row.id, "ignoring receipt of unknown kind {}", other)
            }
        }
    }
    Ok(Message {
        id: row.id,
        chat_id: row.chat_id,
        sender: row.sender_id,
        body: row.body,
        message_type,
        reply_for_message: row.reply_for_message,
        attachments: row.attachments,
        delivereds,
        reads,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}
