use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted user-to-socket mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketSession {
    #[serde(with = "crate::id")]
    pub user_id: i64,
    pub socket_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
