//! Gateway wire format: inbound frames are decoded into typed events before
//! any business logic runs; outbound frames are events or acknowledgments.

use parley_core::error::CoreError;
use parley_models::gateway::{
    AckError, AckFrame, ClientFrame, JoinChatRoomPayload, ReadMessagePayload, SendMessagePayload,
    ServerEvent, UpdateMessagePayload, EVENT_JOIN_CHAT_ROOM, EVENT_PING, EVENT_READ_MESSAGE,
    EVENT_SEND_MESSAGE, EVENT_UPDATE_MESSAGE,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub const CODE_RATE_LIMITED: &str = "rate_limited";

#[derive(Debug, Clone)]
pub enum ClientEvent {
    Ping,
    JoinChatRoom(JoinChatRoomPayload),
    SendMessage(SendMessagePayload),
    UpdateMessage(UpdateMessagePayload),
    ReadMessage(ReadMessagePayload),
}

impl ClientEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::Ping => EVENT_PING,
            ClientEvent::JoinChatRoom(_) => EVENT_JOIN_CHAT_ROOM,
            ClientEvent::SendMessage(_) => EVENT_SEND_MESSAGE,
            ClientEvent::UpdateMessage(_) => EVENT_UPDATE_MESSAGE,
            ClientEvent::ReadMessage(_) => EVENT_READ_MESSAGE,
        }
    }
}

pub fn parse_frame(text: &str) -> Result<ClientFrame, CoreError> {
    serde_json::from_str(text)
        .map_err(|err| CoreError::ValidationFailed(format!("malformed frame: {err}")))
}

pub fn decode_event(frame: &ClientFrame) -> Result<ClientEvent, CoreError> {
    match frame.event.as_str() {
        EVENT_PING => Ok(ClientEvent::Ping),
        EVENT_JOIN_CHAT_ROOM => payload(frame).map(ClientEvent::JoinChatRoom),
        EVENT_SEND_MESSAGE => payload(frame).map(ClientEvent::SendMessage),
        EVENT_UPDATE_MESSAGE => payload(frame).map(ClientEvent::UpdateMessage),
        EVENT_READ_MESSAGE => payload(frame).map(ClientEvent::ReadMessage),
        other => Err(CoreError::ValidationFailed(format!("unknown event: {other}"))),
    }
}

fn payload<T: DeserializeOwned>(frame: &ClientFrame) -> Result<T, CoreError> {
    T::deserialize(&frame.data).map_err(|err| {
        CoreError::ValidationFailed(format!("invalid {} payload: {err}", frame.event))
    })
}

pub fn event_frame<T: Serialize>(event: &str, data: T) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ServerEvent { event, data })
}

pub fn ack_ok(ack: u64, data: Value) -> Result<String, serde_json::Error> {
    serde_json::to_string(&AckFrame {
        ack,
        ok: true,
        data: Some(data),
        error: None,
    })
}

pub fn ack_rejected(
    ack: u64,
    code: &'static str,
    message: String,
) -> Result<String, serde_json::Error> {
    serde_json::to_string(&AckFrame {
        ack,
        ok: false,
        data: None,
        error: Some(AckError { code, message }),
    })
}

/// Storage details stay in the logs; clients only see the code.
pub fn ack_error(ack: u64, err: &CoreError) -> Result<String, serde_json::Error> {
    let message = match err {
        CoreError::Storage(_) | CoreError::Internal(_) => "internal storage failure".to_string(),
        other => other.to_string(),
    };
    ack_rejected(ack, err.code(), message)
}
