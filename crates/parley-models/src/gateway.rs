use serde::{Deserialize, Serialize};

use crate::message::MessageType;

// Client -> Server events
pub const EVENT_PING: &str = "ping";
pub const EVENT_JOIN_CHAT_ROOM: &str = "join_chat_room";
pub const EVENT_SEND_MESSAGE: &str = "send_message";
pub const EVENT_UPDATE_MESSAGE: &str = "update_message";
pub const EVENT_READ_MESSAGE: &str = "read_message";

// Server -> Client events
pub const EVENT_PONG: &str = "pong";
pub const EVENT_RECEIVE_MESSAGE: &str = "receive_message";
pub const EVENT_MESSAGE_UPDATED: &str = "message_updated";

/// Inbound text frame. `ack` is echoed back on the acknowledgment.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientFrame {
    pub event: String,
    #[serde(default)]
    pub data: serde_json::Value,
    #[serde(default)]
    pub ack: Option<u64>,
}

/// Outbound event frame.
#[derive(Debug, Clone, Serialize)]
pub struct ServerEvent<'a, T: Serialize> {
    pub event: &'a str,
    pub data: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckError {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AckFrame {
    pub ack: u64,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AckError>,
}

/// `join_chat_room` accepts a bare id or `{ "chat_id": ... }`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum JoinChatRoomPayload {
    Bare(#[serde(with = "crate::id")] i64),
    Object {
        #[serde(with = "crate::id")]
        chat_id: i64,
    },
}

impl JoinChatRoomPayload {
    pub fn chat_id(&self) -> i64 {
        match self {
            JoinChatRoomPayload::Bare(id) => *id,
            JoinChatRoomPayload::Object { chat_id } => *chat_id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendMessagePayload {
    #[serde(with = "crate::id::option_vec", default)]
    pub participants: Option<Vec<i64>>,
    #[serde(default)]
    pub chat_name: Option<String>,
    #[serde(default)]
    pub is_group: Option<bool>,
    #[serde(deserialize_with = "crate::id::string_or_number")]
    pub recipient: String,
    #[serde(default)]
    pub body: String,
    #[serde(rename = "type", default)]
    pub message_type: MessageType,
    #[serde(with = "crate::id::option", default)]
    pub reply_for_message: Option<i64>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateMessagePayload {
    #[serde(with = "crate::id")]
    pub message_id: i64,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(rename = "type", default)]
    pub message_type: Option<MessageType>,
    #[serde(default)]
    pub attachments: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ReadMessagePayload {
    Bare(#[serde(with = "crate::id")] i64),
    Object {
        #[serde(with = "crate::id")]
        message_id: i64,
    },
}

impl ReadMessagePayload {
    pub fn message_id(&self) -> i64 {
        match self {
            ReadMessagePayload::Bare(id) => *id,
            ReadMessagePayload::Object { message_id } => *message_id,
        }
    }
}
