pub mod auth;
pub mod chat;
pub mod delivery;
pub mod error;
pub mod hub;
pub mod message;
pub mod sessions;
pub mod transport;
pub mod users;

use parley_db::DbPool;
use parley_models::chat::SentMessage;
use parley_models::gateway::{SendMessagePayload, EVENT_MESSAGE_UPDATED};
use parley_models::message::{Message, MessagePatch};
use std::sync::Arc;

use crate::auth::{Authenticator, JwtAuthenticator};
use crate::chat::ChatResolver;
use crate::delivery::{DeliveryReport, DeliveryRouter};
use crate::error::CoreError;
use crate::hub::SocketHub;
use crate::message::MessageStore;
use crate::sessions::{DbSessionRegistry, SessionRegistry};
use crate::transport::{chat_room, Transport};
use crate::users::{DbUserDirectory, UserDirectory};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub jwt_secret: String,
    pub jwt_expiry_seconds: u64,
    pub gateway: GatewayLimits,
}

#[derive(Clone, Debug)]
pub struct GatewayLimits {
    pub max_connections: usize,
    pub max_connections_per_user: usize,
    pub max_messages_per_minute: u32,
    /// Outbound frames queued per connection before emits are dropped.
    pub outbound_buffer: usize,
}

impl Default for GatewayLimits {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            max_connections_per_user: 5,
            max_messages_per_minute: 120,
            outbound_buffer: 256,
        }
    }
}

/// Shared services. Collaborators are injected so tests can swap them.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub hub: Arc<SocketHub>,
    pub sessions: Arc<dyn SessionRegistry>,
    pub users: Arc<dyn UserDirectory>,
    pub auth: Arc<dyn Authenticator>,
}

impl AppState {
    /// Database-backed collaborators and an in-process hub.
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let hub = Arc::new(SocketHub::new(config.gateway.outbound_buffer));
        Self {
            sessions: Arc::new(DbSessionRegistry::new(db.clone())),
            users: Arc::new(DbUserDirectory::new(db.clone())),
            auth: Arc::new(JwtAuthenticator::new(db.clone(), config.jwt_secret.clone())),
            hub,
            db,
            config,
        }
    }

    pub fn messages(&self) -> MessageStore {
        MessageStore::new(self.db.clone())
    }

    pub fn chats(&self) -> ChatResolver {
        ChatResolver::new(self.db.clone(), self.users.clone(), self.messages())
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.hub.clone()
    }

    pub fn router(&self) -> DeliveryRouter {
        DeliveryRouter::new(self.sessions.clone(), self.transport(), self.messages())
    }

    /// Resolve the chat, store the message and fan it out. Routing problems
    /// never undo the stored message.
    pub async fn send_message(
        &self,
        payload: SendMessagePayload,
        sender_id: i64,
        sending_socket: Option<&str>,
    ) -> Result<(SentMessage, DeliveryReport), CoreError> {
        let sent = self.chats().send_message(payload, sender_id).await?;
        let report = self
            .router()
            .route(&sent.message, &sent.chat.participants, sending_socket)
            .await;
        Ok((sent, report))
    }

    /// Persist an edit and broadcast it to the chat room only.
    pub async fn update_message(&self, id: i64, patch: MessagePatch) -> Result<Message, CoreError> {
        let message = self.messages().update(id, patch).await?;
        match serde_json::to_value(&message) {
            Ok(payload) => {
                if let Err(err) = self
                    .hub
                    .emit_to_room(&chat_room(message.chat_id), EVENT_MESSAGE_UPDATED, &payload)
                    .await
                {
                    tracing::warn!(message_id = message.id, "update broadcast failed: {}", err);
                }
            }
            Err(err) => {
                tracing::error!(message_id = message.id, "failed to encode message: {}", err)
            }
        }
        Ok(message)
    }

    /// Record that `reader` read the message. Nothing is broadcast.
    pub async fn read_message(&self, id: i64, reader: i64) -> Result<(), CoreError> {
        self.messages().append_read(id, &[reader]).await?;
        Ok(())
    }
}
