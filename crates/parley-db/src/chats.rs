use crate::{
    bool_from_any_row, contains_pattern, datetime_from_db_text, datetime_to_db_text,
    placeholders, DbError, DbPool,
};
use chrono::{DateTime, Utc};
use sqlx::Row;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ChatRow {
    pub id: i64,
    pub chat_name: Option<String>,
    pub recipient_key: Option<String>,
    pub is_group: bool,
    pub participants: Vec<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ChatRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            chat_name: row.try_get("chat_name")?,
            recipient_key: row.try_get("recipient_key")?,
            is_group: bool_from_any_row(row, "is_group")?,
            participants: Vec::new(),
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ChatFilter {
    /// Every listed user must participate.
    pub participants: Vec<i64>,
    pub chat_name: Option<String>,
    pub is_group: Option<bool>,
    pub recipient_key: Option<String>,
}

const CHAT_COLUMNS: &str = "c.id, c.chat_name, c.recipient_key, \
     CASE WHEN c.is_group THEN 1 ELSE 0 END AS is_group, c.created_at, c.updated_at";

/// Canonical unordered pair so `A_B` and `B_A` collide on insert.
pub fn direct_pair(a: i64, b: i64) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}:{hi}")
}

#[allow(clippy::too_many_arguments)]
pub async fn create_chat(
    pool: &DbPool,
    id: i64,
    participants: &[i64],
    recipient_key: Option<&str>,
    direct_pair: Option<&str>,
    is_group: bool,
    chat_name: Option<&str>,
) -> Result<ChatRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let mut tx = pool.begin().await?;

    sqlx::query(
        "INSERT INTO chats (id, chat_name, recipient_key, direct_pair, is_group,
                            created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(id)
    .bind(chat_name)
    .bind(recipient_key)
    .bind(direct_pair)
    .bind(is_group)
    .bind(&now)
    .bind(&now)
    .execute(&mut *tx)
    .await?;

    insert_participants(&mut tx, id, participants).await?;
    tx.commit().await?;

    get_chat(pool, id).await?.ok_or(DbError::NotFound)
}

async fn insert_participants(
    tx: &mut sqlx::Transaction<'_, sqlx::Any>,
    chat_id: i64,
    participants: &[i64],
) -> Result<(), DbError> {
    for (position, user_id) in participants.iter().enumerate() {
        sqlx::query(
            "INSERT INTO chat_participants (chat_id, user_id, position) VALUES ($1, $2, $3)",
        )
        .bind(chat_id)
        .bind(*user_id)
        .bind(position as i64)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

pub async fn get_chat(pool: &DbPool, id: i64) -> Result<Option<ChatRow>, DbError> {
    let row = sqlx::query_as::<_, ChatRow>(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats c WHERE c.id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(with_participants(pool, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// First chat whose `recipient_key` equals either key.
pub async fn find_chat_by_recipient_keys(
    pool: &DbPool,
    key: &str,
    reverse_key: &str,
) -> Result<Option<ChatRow>, DbError> {
    let row = sqlx::query_as::<_, ChatRow>(&format!(
        "SELECT {CHAT_COLUMNS} FROM chats c
         WHERE c.recipient_key = $1 OR c.recipient_key = $2
         ORDER BY c.id ASC
         LIMIT 1"
    ))
    .bind(key)
    .bind(reverse_key)
    .fetch_optional(pool)
    .await?;
    match row {
        Some(row) => Ok(with_participants(pool, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

pub async fn get_participant_ids(pool: &DbPool, chat_id: i64) -> Result<Vec<i64>, DbError> {
    let ids: Vec<i64> = sqlx::query_scalar(
        "SELECT user_id FROM chat_participants
         WHERE chat_id = $1 ORDER BY position ASC, user_id ASC",
    )
    .bind(chat_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

pub async fn update_chat(
    pool: &DbPool,
    id: i64,
    chat_name: Option<&str>,
    is_group: Option<bool>,
    participants: Option<&[i64]>,
) -> Result<Option<ChatRow>, DbError> {
    let mut tx = pool.begin().await?;
    let result = sqlx::query(
        "UPDATE chats SET
            chat_name = COALESCE($2, chat_name),
            is_group = COALESCE($3, is_group),
            updated_at = $4
         WHERE id = $1",
    )
    .bind(id)
    .bind(chat_name)
    .bind(is_group)
    .bind(datetime_to_db_text(Utc::now()))
    .execute(&mut *tx)
    .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }

    if let Some(participants) = participants {
        sqlx::query("DELETE FROM chat_participants WHERE chat_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        insert_participants(&mut tx, id, participants).await?;
    }
    tx.commit().await?;

    get_chat(pool, id).await
}

/// Deletes the chat and everything hanging off it. Returns the row as it
/// was before deletion.
pub async fn delete_chat(pool: &DbPool, id: i64) -> Result<Option<ChatRow>, DbError> {
    let Some(existing) = get_chat(pool, id).await? else {
        return Ok(None);
    };
    let result = sqlx::query("DELETE FROM chats WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(existing))
}

pub async fn list_chats(
    pool: &DbPool,
    filter: &ChatFilter,
    limit: i64,
    offset: i64,
) -> Result<(Vec<ChatRow>, i64), DbError> {
    let mut required = filter.participants.clone();
    required.sort_unstable();
    required.dedup();

    let mut conditions = Vec::new();
    let mut next = 1;
    if !required.is_empty() {
        conditions.push(format!(
            "c.id IN (SELECT chat_id FROM chat_participants WHERE user_id IN ({}) \
             GROUP BY chat_id HAVING COUNT(DISTINCT user_id) = {})",
            placeholders(next, required.len()),
            required.len()
        ));
        next += required.len();
    }
    if filter.chat_name.is_some() {
        conditions.push(format!("LOWER(c.chat_name) LIKE ${next} ESCAPE '\\'"));
        next += 1;
    }
    if filter.is_group.is_some() {
        conditions.push(format!("c.is_group = ${next}"));
        next += 1;
    }
    if filter.recipient_key.is_some() {
        conditions.push(format!("LOWER(c.recipient_key) LIKE ${next} ESCAPE '\\'"));
        next += 1;
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    let count_sql = format!("SELECT COUNT(*) FROM chats c {where_clause}");
    let list_sql = format!(
        "SELECT {CHAT_COLUMNS} FROM chats c {where_clause}
         ORDER BY c.updated_at DESC, c.id DESC
         LIMIT ${} OFFSET ${}",
        next,
        next + 1
    );

    let name_pattern = filter.chat_name.as_deref().map(contains_pattern);
    let key_pattern = filter.recipient_key.as_deref().map(contains_pattern);

    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    let mut list_query = sqlx::query_as::<_, ChatRow>(&list_sql);
    for user_id in &required {
        count_query = count_query.bind(*user_id);
        list_query = list_query.bind(*user_id);
    }
    if let Some(pattern) = &name_pattern {
        count_query = count_query.bind(pattern.clone());
        list_query = list_query.bind(pattern.clone());
    }
    if let Some(is_group) = filter.is_group {
        count_query = count_query.bind(is_group);
        list_query = list_query.bind(is_group);
    }
    if let Some(pattern) = &key_pattern {
        count_query = count_query.bind(pattern.clone());
        list_query = list_query.bind(pattern.clone());
    }

    let total = count_query.fetch_one(pool).await?;
    let rows = list_query.bind(limit).bind(offset).fetch_all(pool).await?;
    Ok((with_participants(pool, rows).await?, total))
}

async fn with_participants(pool: &DbPool, mut rows: Vec<ChatRow>) -> Result<Vec<ChatRow>, DbError> {
    if rows.is_empty() {
        return Ok(rows);
    }
    let ids: Vec<i64> = rows.iter().map(|row| row.id).collect();
    let sql = format!(
        "SELECT chat_id, user_id FROM chat_participants
         WHERE chat_id IN ({})
         ORDER BY chat_id ASC, position ASC, user_id ASC",
        placeholders(1, ids.len())
    );
    let mut query = sqlx::query_as::<_, (i64, i64)>(&sql);
    for id in &ids {
        query = query.bind(*id);
    }
    let mut by_chat: HashMap<i64, Vec<i64>> = HashMap::new();
    for (chat_id, user_id) in query.fetch_all(pool).await? {
        by_chat.entry(chat_id).or_default().push(user_id);
    }
    for row in &mut rows {
        row.participants = by_chat.remove(&row.id).unwrap_or_default();
    }
    Ok(rows)
}
