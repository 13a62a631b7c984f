use crate::{datetime_from_db_text, datetime_to_db_text, DbError, DbPool};
use chrono::{DateTime, Utc};
use sqlx::Row;

/// Issued credential pair. A row existing for a user means its access token
/// has not been revoked.
#[derive(Debug, Clone)]
pub struct AuthTokenRow {
    pub user_id: i64,
    pub access_token: String,
    pub refresh_token: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for AuthTokenRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            user_id: row.try_get("user_id")?,
            access_token: row.try_get("access_token")?,
            refresh_token: row.try_get("refresh_token")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

pub async fn upsert_auth_token(
    pool: &DbPool,
    user_id: i64,
    access_token: &str,
    refresh_token: &str,
) -> Result<AuthTokenRow, DbError> {
    let row = sqlx::query_as::<_, AuthTokenRow>(
        "INSERT INTO auth_tokens (user_id, access_token, refresh_token, created_at)
         VALUES ($1, $2, $3, $4)
         ON CONFLICT (user_id) DO UPDATE SET
            access_token = EXCLUDED.access_token,
            refresh_token = EXCLUDED.refresh_token,
            created_at = EXCLUDED.created_at
         RETURNING user_id, access_token, refresh_token, created_at",
    )
    .bind(user_id)
    .bind(access_token)
    .bind(refresh_token)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_auth_token_by_user_id(
    pool: &DbPool,
    user_id: i64,
) -> Result<Option<AuthTokenRow>, DbError> {
    let row = sqlx::query_as::<_, AuthTokenRow>(
        "SELECT user_id, access_token, refresh_token, created_at
         FROM auth_tokens WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Revokes the user's credential. Returns whether a row was removed.
pub async fn delete_auth_token(pool: &DbPool, user_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM auth_tokens WHERE user_id = $1")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
