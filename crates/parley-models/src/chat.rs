use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    #[serde(with = "crate::id")]
    pub id: i64,
    #[serde(with = "crate::id::vec")]
    pub participants: Vec<i64>,
    pub is_group: bool,
    pub chat_name: Option<String>,
    pub recipient_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.participants.contains(&user_id)
    }
}

#[derive(Debug, Clone, Default)]
pub struct NewChat {
    pub participants: Vec<i64>,
    pub recipient_key: Option<String>,
    pub is_group: bool,
    pub chat_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatPatch {
    pub chat_name: Option<String>,
    pub is_group: Option<bool>,
    #[serde(with = "crate::id::option_vec", default)]
    pub participants: Option<Vec<i64>>,
}

/// Key for a 1:1 thread as seen from `first`.
pub fn direct_key(first: &str, second: &str) -> String {
    format!("{first}_{second}")
}

/// Result of a send: the resolved thread and the persisted message.
#[derive(Debug, Clone, Serialize)]
pub struct SentMessage {
    pub chat: Chat,
    pub message: crate::message::Message,
}
