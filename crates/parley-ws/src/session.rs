use parley_models::user::Identity;
use std::collections::BTreeSet;

/// Per-connection state once the credential has been accepted.
pub struct GatewaySession {
    pub socket_id: String,
    pub identity: Identity,
    pub rooms: BTreeSet<i64>,
}

impl GatewaySession {
    pub fn new(identity: Identity) -> Self {
        Self {
            socket_id: uuid::Uuid::new_v4().to_string(),
            identity,
            rooms: BTreeSet::new(),
        }
    }

    pub fn user_id(&self) -> i64 {
        self.identity.user_id
    }

    /// Returns false when the chat room was already joined.
    pub fn join(&mut self, chat_id: i64) -> bool {
        self.rooms.insert(chat_id)
    }
}
