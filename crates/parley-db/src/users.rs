use crate::{
    datetime_from_db_text, datetime_to_db_text, string_list_from_db_text, string_list_to_db_text,
    DbError, DbPool,
};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for UserRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let created_at_raw: String = row.try_get("created_at")?;
        Ok(Self {
            id: row.try_get("id")?,
            username: row.try_get("username")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: datetime_from_db_text(&created_at_raw)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProfileRow {
    pub user_id: i64,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub interests: Vec<String>,
    pub updated_at: DateTime<Utc>,
}

impl<'r> sqlx::FromRow<'r, sqlx::any::AnyRow> for ProfileRow {
    fn from_row(row: &'r sqlx::any::AnyRow) -> Result<Self, sqlx::Error> {
        let birthday_raw: Option<String> = row.try_get("birthday")?;
        let interests_raw: String = row.try_get("interests")?;
        let updated_at_raw: String = row.try_get("updated_at")?;
        let birthday = birthday_raw
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| sqlx::Error::Protocol(format!("invalid birthday '{raw}': {e}")))
            })
            .transpose()?;
        Ok(Self {
            user_id: row.try_get("user_id")?,
            display_name: row.try_get("display_name")?,
            gender: row.try_get("gender")?,
            birthday,
            height: row.try_get("height")?,
            weight: row.try_get("weight")?,
            interests: string_list_from_db_text(&interests_raw)?,
            updated_at: datetime_from_db_text(&updated_at_raw)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProfileInput<'a> {
    pub display_name: Option<&'a str>,
    pub gender: Option<&'a str>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub interests: &'a [String],
}

const USER_COLUMNS: &str = "id, username, email, password_hash, created_at";
const PROFILE_COLUMNS: &str =
    "user_id, display_name, gender, birthday, height, weight, interests, updated_at";

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    email: &str,
    password_hash: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, username, email, password_hash, created_at)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(username)
    .bind(email)
    .bind(password_hash)
    .bind(datetime_to_db_text(Utc::now()))
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn upsert_profile(
    pool: &DbPool,
    user_id: i64,
    input: ProfileInput<'_>,
) -> Result<ProfileRow, DbError> {
    let now = datetime_to_db_text(Utc::now());
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "INSERT INTO profiles (user_id, display_name, gender, birthday, height, weight, interests,
                               created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
         ON CONFLICT (user_id) DO UPDATE SET
            display_name = EXCLUDED.display_name,
            gender = EXCLUDED.gender,
            birthday = EXCLUDED.birthday,
            height = EXCLUDED.height,
            weight = EXCLUDED.weight,
            interests = EXCLUDED.interests,
            updated_at = EXCLUDED.updated_at
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(user_id)
    .bind(input.display_name)
    .bind(input.gender)
    .bind(input.birthday.map(|d| d.format("%Y-%m-%d").to_string()))
    .bind(input.height)
    .bind(input.weight)
    .bind(string_list_to_db_text(input.interests))
    .bind(&now)
    .bind(&now)
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_profile(pool: &DbPool, user_id: i64) -> Result<Option<ProfileRow>, DbError> {
    let row = sqlx::query_as::<_, ProfileRow>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}
