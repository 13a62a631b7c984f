use crate::{datetime_from_db_text, datetime_to_db_text, placeholders, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct SocketSessionRow {
    pub user_id: i64,
    pub socket_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for SocketSessionRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        Ok(Self {
            user_id: row.try_get("user_id")?,
            socket_id: row.try_get("socket_id")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

/// One row per user: a reconnect overwrites the previous socket id.
pub async fn upsert_socket_session(
    pool: &DbPool,
    user_id: i64,
    socket_id: &str,
) -> Result<SocketSessionRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let row = sqlx::query_as::<_, SocketSessionRow>(
        "INSERT INTO socket_sessions (user_id, socket_id, created_at, updated_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (user_id) DO UPDATE SET
            socket_id = EXCLUDED.socket_id,
            updated_at = EXCLUDED.updated_at
         RETURNING user_id, socket_id, created_at, updated_at",
    )
    .bind(user_id)
    .bind(socket_id)
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_by_user(pool: &DbPool, user_id: i64) -> Result<Option<SocketSessionRow>, DbError> {
    let row = sqlx::query_as::<_, SocketSessionRow>(
        "SELECT user_id, socket_id, created_at, updated_at FROM socket_sessions WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_by_socket(
    pool: &DbPool,
    socket_id: &str,
) -> Result<Option<SocketSessionRow>, DbError> {
    let row = sqlx::query_as::<_, SocketSessionRow>(
        "SELECT user_id, socket_id, created_at, updated_at
         FROM socket_sessions WHERE socket_id = $1",
    )
    .bind(socket_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Removes the session owning `socket_id` and returns it.
pub async fn delete_by_socket(
    pool: &DbPool,
    socket_id: &str,
) -> Result<Option<SocketSessionRow>, DbError> {
    let row = sqlx::query_as::<_, SocketSessionRow>(
        "DELETE FROM socket_sessions WHERE socket_id = $1
         RETURNING user_id, socket_id, created_at, updated_at",
    )
    .bind(socket_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn list_by_users(
    pool: &DbPool,
    user_ids: &[i64],
) -> Result<Vec<SocketSessionRow>, DbError> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let sql = format!(
        "SELECT user_id, socket_id, created_at, updated_at FROM socket_sessions
         WHERE user_id IN ({})
         ORDER BY user_id ASC",
        placeholders(1, user_ids.len())
    );
    let mut query = sqlx::query_as::<_, SocketSessionRow>(&sql);
    for id in user_ids {
        query = query.bind(*id);
    }
    Ok(query.fetch_all(pool).await?)
}
