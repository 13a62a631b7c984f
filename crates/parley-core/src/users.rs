use async_trait::async_trait;
use chrono::NaiveDate;
use parley_db::DbPool;
use parley_models::user::{Profile, User};
use parley_util::profile;

use crate::error::CoreError;

/// External identity lookup used to tell direct chats from group chats.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError>;
}

pub struct DbUserDirectory {
    db: DbPool,
}

impl DbUserDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserDirectory for DbUserDirectory {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, CoreError> {
        let row = parley_db::users::get_user_by_id(&self.db, id).await?;
        Ok(row.map(|row| User {
            id: row.id,
            username: row.username,
            email: row.email,
            created_at: row.created_at,
        }))
    }
}

/// Profile with age, horoscope and zodiac derived from the birthday as of
/// `today`. A user without a stored profile gets an empty one.
pub async fn get_profile(
    db: &DbPool,
    user_id: i64,
    today: NaiveDate,
) -> Result<Profile, CoreError> {
    if parley_db::users::get_user_by_id(db, user_id).await?.is_none() {
        return Err(CoreError::NotFound("user"));
    }
    let Some(row) = parley_db::users::get_profile(db, user_id).await? else {
        return Ok(Profile {
            user_id,
            display_name: None,
            gender: None,
            birthday: None,
            height: None,
            weight: None,
            interests: Vec::new(),
            age: None,
            horoscope: None,
            zodiac: None,
        });
    };

    Ok(Profile {
        user_id,
        display_name: row.display_name,
        gender: row.gender,
        birthday: row.birthday,
        height: row.height,
        weight: row.weight,
        interests: row.interests,
        age: row.birthday.map(|b| profile::calculate_age(b, today)),
        horoscope: row
            .birthday
            .map(|b| profile::calculate_horoscope(b).as_str().to_string()),
        zodiac: row
            .birthday
            .map(|b| profile::calculate_zodiac(b).as_str().to_string()),
    })
}
