use crate::{
    contains_pattern, datetime_from_db_text, datetime_to_db_text, placeholders,
    string_list_from_db_text, string_list_to_db_text, DbError, DbPool,
};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub body: String,
    pub message_type: String,
    pub reply_for_message: Option<i64>,
    pub attachments: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for MessageRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let attachments_raw: String = row.try_get("attachments")?;
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            chat_id: row.try_get("chat_id")?,
            sender_id: row.try_get("sender_id")?,
            body: row.try_get("body")?,
            message_type: row.try_get("message_type")?,
            reply_for_message: row.try_get("reply_for_message")?,
            attachments: string_list_from_db_text(&attachments_raw)?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ReceiptRow {
    pub id: i64,
    pub message_id: i64,
    pub kind: String,
    pub recipient_id: i64,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ReceiptRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            message_id: row.try_get("message_id")?,
            kind: row.try_get("kind")?,
            recipient_id: row.try_get("recipient_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct MessageFilter {
    pub chat_id: Option<i64>,
    /// Case-insensitive substring of the body.
    pub body_contains: Option<String>,
}

const MESSAGE_COLUMNS: &str = "m.id, m.chat_id, m.sender_id, m.body, m.message_type, \
     m.reply_for_message, m.attachments, m.created_at, m.updated_at";

#[allow(clippy::too_many_arguments)]
pub async fn create_message(
    pool: &DbPool,
    id: i64,
    chat_id: i64,
    sender_id: i64,
    body: &str,
    message_type: &str,
    reply_for_message: Option<i64>,
    attachments: &[String],
) -> Result<MessageRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let row = sqlx::query_as::<_, MessageRow>(
        "INSERT INTO messages (id, chat_id, sender_id, body, message_type, reply_for_message,
                               attachments, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         RETURNING id, chat_id, sender_id, body, message_type, reply_for_message, attachments,
                   created_at, updated_at",
    )
    .bind(id)
    .bind(chat_id)
    .bind(sender_id)
    .bind(body)
    .bind(message_type)
    .bind(reply_for_message)
    .bind(string_list_to_db_text(attachments))
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE m.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Applies the present fields only.
pub async fn update_message(
    pool: &DbPool,
    id: i64,
    body: Option<&str>,
    message_type: Option<&str>,
    attachments: Option<&[String]>,
) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "UPDATE messages SET
            body = COALESCE($2, body),
            message_type = COALESCE($3, message_type),
            attachments = COALESCE($4, attachments),
            updated_at = $5
         WHERE id = $1
         RETURNING id, chat_id, sender_id, body, message_type, reply_for_message, attachments,
                   created_at, updated_at",
    )
    .bind(id)
    .bind(body)
    .bind(message_type)
    .bind(attachments.map(string_list_to_db_text))
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn delete_message(pool: &DbPool, id: i64) -> Result<Option<MessageRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRow>(
        "DELETE FROM messages WHERE id = $1
         RETURNING id, chat_id, sender_id, body, message_type, reply_for_message, attachments,
                   created_at, updated_at",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Appends one receipt row per recipient, keeping duplicates. Returns the
/// number of rows written; zero means the message does not exist.
pub async fn append_receipts(
    pool: &DbPool,
    message_id: i64,
    kind: &str,
    recipient_ids: &[i64],
    at: DateTime<Utc>,
) -> Result<u64, DbError> {
    let at = datetime_to_db_text(at);
    let mut tx = pool.begin().await?;
    let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM messages WHERE id = $1")
        .bind(message_id)
        .fetch_optional(&mut *tx)
        .await?;
    if exists.is_none() {
        return Err(DbError::NotFound);
    }

    let mut written = 0;
    for recipient_id in recipient_ids {
        let result = sqlx::query(
            "INSERT INTO message_receipts (message_id, kind, recipient_id, created_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(message_id)
        .bind(kind)
        .bind(*recipient_id)
        .bind(&at)
        .execute(&mut *tx)
        .await?;
        written += result.rows_affected();
    }
    tx.commit().await?;
    Ok(written)
}

/// Receipts for the given messages in insertion order.
pub async fn get_receipts(pool: &DbPool, message_ids: &[i64]) -> Result<Vec<ReceiptRow>, DbError> {
    if message_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT id, message_id, kind, recipient_id, created_at FROM message_receipts
         WHERE message_id IN ({})
         ORDER BY id ASC",
        placeholders(1, message_ids.len())
    );
    let mut query = sqlx::query_as::<_, ReceiptRow>(&sql);
    for id in message_ids {
        query = query.bind(*id);
    }
    Ok(query.fetch_all(pool).await?)
}

/// Messages in chats the user participates in, newest first.
pub async fn list_messages_for_user(
    pool: &DbPool,
    user_id: i64,
    filter: &MessageFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<MessageRow>, i64), DbError> {
    let mut conditions = vec![
        "EXISTS (SELECT 1 FROM chat_participants p WHERE p.chat_id = m.chat_id AND p.user_id = $1)"
            .to_string(),
    ];
    let mut next = 2;
    if filter.chat_id.is_some() {
        conditions.push(format!("m.chat_id = ${next}"));
        next += 1;
    }
    if filter.body_contains.is_some() {
        conditions.push(format!("LOWER(m.body) LIKE ${next} ESCAPE '\\'"));
        next += 1;
    }
    let where_clause = conditions.join(" AND ");

    let count_sql = format!("SELECT COUNT(*) FROM messages m WHERE {where_clause}");
    let list_sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM messages m WHERE {where_clause}
         ORDER BY m.id DESC
         LIMIT ${} OFFSET ${}",
        next,
        next + 1
    );

    let pattern = filter.body_contains.as_deref().map(contains_pattern);
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql).bind(user_id);
    let mut list_query = sqlx::query_as::<_, MessageRow>(&list_sql).bind(user_id);
    if let Some(chat_id) = filter.chat_id {
        count_query = count_query.bind(chat_id);
        list_query = list_query.bind(chat_id);
    }
    if let Some(pattern) = &pattern {
        count_query = count_query.bind(pattern.clone());
        list_query = list_query.bind(pattern.clone());
    }

    let total = count_query.fetch_one(pool).await?;
    let rows = list_query.bind(limit).bind(offset).fetch_all(pool).await?;
    Ok((rows, total))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_pool;

    async fn setup_chat(pool: &DbPool) -> i64 {
        crate::chats::create_chat(pool, 100, &[1, 2], Some("1_2"), None, false, None)
            .await
            .unwrap();
        crate::chats::create_chat(pool, 200, &[2, 3], Some("2_3"), None, false, None)
            .await
            .unwrap();
        100
    }

    #[tokio::test]
    async fn test_create_message() {
        let pool = test_pool().await;
        let chat_id = setup_chat(&pool).await;
        let attachments = vec!["https://cdn.example.com/a.png".to_string()];
        let msg = create_message(&pool, 1000, chat_id, 1, "Hello!", "text", None, &attachments)
            .await
            .unwrap();
        assert_eq!(msg.id, 1000);
        assert_eq!(msg.chat_id, chat_id);
        assert_eq!(msg.sender_id, 1);
        assert_eq!(msg.body, "Hello!");
        assert_eq!(msg.attachments, attachments);
        assert!(msg.reply_for_message.is_none());
    }

    #[tokio::test]
    async fn test_update_only_touches_present_fields() {
        let pool = test_pool().await;
        let chat_id = setup_chat(&pool).await;
        create_message(&pool, 1000, chat_id, 1, "Hello!", "text", None, &[])
            .await
            .unwrap();

        let updated = update_message(&pool, 1000, None, Some("markdown"), None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.body, "Hello!");
        assert_eq!(updated.message_type, "markdown");

        assert!(update_message(&pool, 9999, Some("x"), None, None)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_receipts_append_without_dedup() {
        let pool = test_pool().await;
        let chat_id = setup_chat(&pool).await;
        create_message(&pool, 1000, chat_id, 1, "Hello!", "text", None, &[])
            .await
            .unwrap();

        let now = Utc::now();
        assert_eq!(append_receipts(&pool, 1000, "delivered", &[2, 3], now).await.unwrap(), 2);
        assert_eq!(append_receipts(&pool, 1000, "delivered", &[2, 3], now).await.unwrap(), 2);
        assert_eq!(append_receipts(&pool, 1000, "read", &[2], now).await.unwrap(), 1);

        let receipts = get_receipts(&pool, &[1000]).await.unwrap();
        let delivered: Vec<i64> = receipts
            .iter()
            .filter(|r| r.kind == "delivered")
            .map(|r| r.recipient_id)
            .collect();
        assert_eq!(delivered, vec![2, 3, 2, 3]);
        assert_eq!(receipts.iter().filter(|r| r.kind == "read").count(), 1);

        let missing = append_receipts(&pool, 9999, "read", &[2], now).await;
        assert!(matches!(missing, Err(DbError::NotFound)));
    }

    #[tokio::test]
    async fn test_delete_returns_row_and_drops_receipts() {
        let pool = test_pool().await;
        let chat_id = setup_chat(&pool).await;
        create_message(&pool, 1000, chat_id, 1, "Hello!", "text", None, &[])
            .await
            .unwrap();
        append_receipts(&pool, 1000, "read", &[2], Utc::now()).await.unwrap();

        let deleted = delete_message(&pool, 1000).await.unwrap().unwrap();
        assert_eq!(deleted.body, "Hello!");
        assert!(get_message(&pool, 1000).await.unwrap().is_none());
        assert!(get_receipts(&pool, &[1000]).await.unwrap().is_empty());
        assert!(delete_message(&pool, 1000).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_list_is_scoped_to_participant_chats() {
        let pool = test_pool().await;
        let chat_id = setup_chat(&pool).await;
        create_message(&pool, 1000, chat_id, 1, "Hello there", "text", None, &[])
            .await
            .unwrap();
        create_message(&pool, 1001, chat_id, 2, "general KENOBI", "text", None, &[])
            .await
            .unwrap();
        create_message(&pool, 2000, 200, 2, "hello elsewhere", "text", None, &[])
            .await
            .unwrap();

        let (rows, total) = list_messages_for_user(&pool, 1, &MessageFilter::default(), 25, 0)
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows[0].id, 1001);

        let filter = MessageFilter {
            chat_id: None,
            body_contains: Some("hello".into()),
        };
        let (rows, total) = list_messages_for_user(&pool, 2, &filter, 25, 0).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(rows.len(), 2);

        let filter = MessageFilter {
            chat_id: Some(200),
            body_contains: Some("kenobi".into()),
        };
        let (rows, total) = list_messages_for_user(&pool, 2, &filter, 25, 0).await.unwrap();
        assert_eq!(total, 0);
        assert!(rows.is_empty());

        let (rows, total) = list_messages_for_user(&pool, 3, &MessageFilter::default(), 25, 0)
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].id, 2000);
    }
}
