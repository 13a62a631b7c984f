use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(with = "crate::id")]
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Profile {
    #[serde(with = "crate::id")]
    pub user_id: i64,
    pub display_name: Option<String>,
    pub gender: Option<String>,
    pub birthday: Option<NaiveDate>,
    pub height: Option<i64>,
    pub weight: Option<i64>,
    pub interests: Vec<String>,
    pub age: Option<i64>,
    pub horoscope: Option<String>,
    pub zodiac: Option<String>,
}

/// Identity attached to an authenticated credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: i64,
    pub email: String,
    pub username: String,
}
