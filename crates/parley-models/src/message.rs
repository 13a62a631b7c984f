use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Markdown,
    Image,
    File,
}

impl MessageType {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Markdown => "markdown",
            MessageType::Image => "image",
            MessageType::File => "file",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MessageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(MessageType::Text),
            "markdown" => Ok(MessageType::Markdown),
            "image" => Ok(MessageType::Image),
            "file" => Ok(MessageType::File),
            other => Err(format!("unknown message type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptKind {
    Delivered,
    Read,
}

impl ReceiptKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ReceiptKind::Delivered => "delivered",
            ReceiptKind::Read => "read",
        }
    }
}

/// One delivery or read mark. Entries are append-only and a recipient may
/// appear more than once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    #[serde(with = "crate::id")]
    pub by: i64,
    pub time: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(with = "crate::id")]
    pub id: i64,
    #[serde(with = "crate::id")]
    pub chat_id: i64,
    #[serde(with = "crate::id")]
    pub sender: i64,
    pub body: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(with = "crate::id::option", default)]
    pub reply_for_message: Option<i64>,
    pub attachments: Vec<String>,
    pub delivereds: Vec<Receipt>,
    pub reads: Vec<Receipt>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields accepted when persisting a new message.
#[derive(Debug, Clone, Default)]
pub struct NewMessage {
    pub chat_id: i64,
    pub sender: i64,
    pub body: String,
    pub message_type: MessageType,
    pub reply_for_message: Option<i64>,
    pub attachments: Vec<String>,
}

/// Partial edit. Absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MessagePatch {
    pub body: Option<String>,
    #[serde(rename = "type")]
    pub message_type: Option<MessageType>,
    pub attachments: Option<Vec<String>>,
}

impl MessagePatch {
    pub fn is_empty(&self) -> bool {
        self.body.is_none() && self.message_type.is_none() && self.attachments.is_none()
    }
}
