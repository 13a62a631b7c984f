use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection {0} is not attached")]
    UnknownConnection(String),
    #[error("outbound queue full for connection {0}")]
    Backpressure(String),
    #[error("connection {0} is closed")]
    Closed(String),
    #[error("failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomConnection {
    pub connection_id: String,
    pub user_id: i64,
}

/// Room-based publish/subscribe over live connections.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn join(&self, connection_id: &str, room: &str) -> Result<(), TransportError>;
    /// Returns how many connections the event was queued for.
    async fn emit_to_room(
        &self,
        room: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<usize, TransportError>;
    async fn emit_to_connection(
        &self,
        connection_id: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), TransportError>;
    async fn list_connections_in_room(
        &self,
        room: &str,
    ) -> Result<Vec<RoomConnection>, TransportError>;
}

/// Room name for a chat's live channel.
pub fn chat_room(chat_id: i64) -> String {
    chat_id.to_string()
}
