//! Fan-out of a freshly stored message to live connections.
//!
//! Delivery is best-effort: a participant counts as reached when one of
//! their connections is in the chat room or when the registry knows a
//! session for them. Neither is a client acknowledgment.

use parley_models::gateway::EVENT_RECEIVE_MESSAGE;
use parley_models::message::Message;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::message::MessageStore;
use crate::sessions::SessionRegistry;
use crate::transport::{chat_room, Transport};

/// Outcome of one routing pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections the room broadcast was queued for.
    pub broadcast: usize,
    /// Connections notified outside the room.
    pub notified: Vec<String>,
    /// Users a delivered receipt was recorded for.
    pub delivered_to: Vec<i64>,
    /// Room or registry lookups failed, or receipts could not be written.
    pub degraded: bool,
}

#[derive(Clone)]
pub struct DeliveryRouter {
    sessions: Arc<dyn SessionRegistry>,
    transport: Arc<dyn Transport>,
    messages: MessageStore,
}

struct Plan {
    notify: BTreeSet<String>,
    reached: BTreeSet<i64>,
}

impl DeliveryRouter {
    pub fn new(
        sessions: Arc<dyn SessionRegistry>,
        transport: Arc<dyn Transport>,
        messages: MessageStore,
    ) -> Self {
        Self {
            sessions,
            transport,
            messages,
        }
    }

    /// Broadcasts `message` to its chat room, notifies participants connected
    /// elsewhere, then records delivered receipts. Never fails: lookup and
    /// emission errors are logged and reflected in the report.
    pub async fn route(
        &self,
        message: &Message,
        participants: &[i64],
        sending_socket: Option<&str>,
    ) -> DeliveryReport {
        let room = chat_room(message.chat_id);
        let plan = self.plan(&room, participants, sending_socket).await;
        let mut report = DeliveryReport {
            degraded: plan.is_none(),
            ..Default::default()
        };

        let payload = match serde_json::to_value(message) {
            Ok(payload) => payload,
            Err(err) => {
                tracing::error!(message_id = message.id, "failed to encode message: {}", err);
                report.degraded = true;
                return report;
            }
        };

        match self
            .transport
            .emit_to_room(&room, EVENT_RECEIVE_MESSAGE, &payload)
            .await
        {
            Ok(count) => report.broadcast = count,
            Err(err) => {
                tracing::warn!(
                    chat_id = message.chat_id,
                    message_id = message.id,
                    "room broadcast failed: {}",
                    err
                )
            }
        }

        let Some(plan) = plan else {
            return report;
        };

        for socket_id in &plan.notify {
            match self
                .transport
                .emit_to_connection(socket_id, EVENT_RECEIVE_MESSAGE, &payload)
                .await
            {
                Ok(()) => report.notified.push(socket_id.clone()),
                Err(err) => {
                    tracing::warn!(
                        socket_id = %socket_id,
                        message_id = message.id,
                        "direct notify failed: {}",
                        err
                    )
                }
            }
        }

        let reached: Vec<i64> = plan.reached.into_iter().collect();
        if !reached.is_empty() {
            match self.messages.append_delivered(message.id, &reached).await {
                Ok(_) => report.delivered_to = reached,
                Err(err) => {
                    tracing::warn!(message_id = message.id, "failed to record delivery: {}", err);
                    report.degraded = true;
                }
            }
        }

        tracing::debug!(
            chat_id = message.chat_id,
            message_id = message.id,
            broadcast = report.broadcast,
            notified = report.notified.len(),
            delivered = report.delivered_to.len(),
            "message routed"
        );
        report
    }

    /// Snapshot of room presence against known sessions. `None` when either
    /// lookup fails.
    async fn plan(
        &self,
        room: &str,
        participants: &[i64],
        sending_socket: Option<&str>,
    ) -> Option<Plan> {
        let in_room = match self.transport.list_connections_in_room(room).await {
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(room, "routing degraded, room lookup failed: {}", err);
                return None;
            }
        };
        let known = match self.sessions.find_all_by_users(participants).await {
            Ok(list) => list,
            Err(err) => {
                tracing::warn!(room, "routing degraded, session lookup failed: {}", err);
                return None;
            }
        };

        let in_room_sockets: BTreeSet<&str> =
            in_room.iter().map(|c| c.connection_id.as_str()).collect();
        let in_room_users: BTreeSet<i64> = in_room.iter().map(|c| c.user_id).collect();

        let mut notify: BTreeSet<String> = known
            .iter()
            .filter(|s| !in_room_sockets.contains(s.socket_id.as_str()))
            .map(|s| s.socket_id.clone())
            .collect();
        if let Some(sender) = sending_socket {
            notify.remove(sender);
        }

        let known_users: BTreeSet<i64> = known.iter().map(|s| s.user_id).collect();
        let reached = known_users.union(&in_room_users).copied().collect();

        Some(Plan { notify, reached })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::transport::{RoomConnection, TransportError};
    use async_trait::async_trait;
    use chrono::Utc;
    use parley_models::message::NewMessage;
    use parley_models::session::SocketSession;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeRegistry {
        sessions: Vec<(i64, &'static str)>,
        fail: bool,
    }

    #[async_trait]
    impl SessionRegistry for FakeRegistry {
        async fn register(&self, _: i64, _: &str) -> Result<SocketSession, CoreError> {
            unimplemented!()
        }
        async fn unregister_by_socket(&self, _: &str) -> Result<Option<SocketSession>, CoreError> {
            unimplemented!()
        }
        async fn find_by_user(&self, _: i64) -> Result<Option<SocketSession>, CoreError> {
            unimplemented!()
        }
        async fn find_by_socket(&self, _: &str) -> Result<Option<SocketSession>, CoreError> {
            unimplemented!()
        }
        async fn find_all_by_users(
            &self,
            user_ids: &[i64],
        ) -> Result<Vec<SocketSession>, CoreError> {
            if self.fail {
                return Err(CoreError::Internal("registry offline".into()));
            }
            Ok(self
                .sessions
                .iter()
                .filter(|(user, _)| user_ids.contains(user))
                .map(|(user_id, socket)| SocketSession {
                    user_id: *user_id,
                    socket_id: socket.to_string(),
                    created_at: Utc::now(),
                    updated_at: Utc::now(),
                })
                .collect())
        }
    }

    #[derive(Default)]
    struct FakeTransport {
        room: Vec<(&'static str, i64)>,
        room_emits: Mutex<Vec<(String, String)>>,
        direct_emits: Mutex<Vec<String>>,
        unreachable: Vec<&'static str>,
    }

    #[async_trait]
    impl Transport for FakeTransport {
        async fn join(&self, _: &str, _: &str) -> Result<(), TransportError> {
            Ok(())
        }
        async fn emit_to_room(
            &self,
            room: &str,
            event: &str,
            _: &serde_json::Value,
        ) -> Result<usize, TransportError> {
            self.room_emits
                .lock()
                .unwrap()
                .push((room.to_string(), event.to_string()));
            Ok(self.room.len())
        }
        async fn emit_to_connection(
            &self,
            connection_id: &str,
            _: &str,
            _: &serde_json::Value,
        ) -> Result<(), TransportError> {
            if self.unreachable.iter().any(|s| *s == connection_id) {
                return Err(TransportError::Closed(connection_id.to_string()));
            }
            self.direct_emits.lock().unwrap().push(connection_id.to_string());
            Ok(())
        }
        async fn list_connections_in_room(
            &self,
            _: &str,
        ) -> Result<Vec<RoomConnection>, TransportError> {
            Ok(self
                .room
                .iter()
                .map(|(connection_id, user_id)| RoomConnection {
                    connection_id: connection_id.to_string(),
                    user_id: *user_id,
                })
                .collect())
        }
    }

    async fn stored_message() -> (MessageStore, Message) {
        let pool = parley_db::create_pool("sqlite::memory:", 1).await.unwrap();
        parley_db::run_migrations(&pool).await.unwrap();
        parley_db::chats::create_chat(&pool, 10, &[1, 2, 3], Some("team"), None, true, None)
            .await
            .unwrap();
        let store = MessageStore::new(pool);
        let message = store
            .create(NewMessage {
                chat_id: 10,
                sender: 1,
                body: "hi".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        (store, message)
    }

    fn router(
        registry: FakeRegistry,
        transport: Arc<FakeTransport>,
        store: MessageStore,
    ) -> DeliveryRouter {
        DeliveryRouter::new(Arc::new(registry), transport, store)
    }

    #[tokio::test]
    async fn absent_but_connected_participant_is_notified_individually() {
        let (store, message) = stored_message().await;
        let transport = Arc::new(FakeTransport {
            room: vec![("s1", 1)],
            ..Default::default()
        });
        let registry = FakeRegistry {
            sessions: vec![(1, "s1"), (2, "s2")],
            ..Default::default()
        };
        let report = router(registry, transport.clone(), store.clone())
            .route(&message, &[1, 2], None)
            .await;

        assert_eq!(*transport.direct_emits.lock().unwrap(), vec!["s2".to_string()]);
        assert_eq!(report.notified, vec!["s2".to_string()]);
        assert_eq!(report.delivered_to, vec![1, 2]);
        assert!(!report.degraded);

        let reloaded = store.find_one(message.id).await.unwrap();
        let mut by: Vec<i64> = reloaded.delivereds.iter().map(|r| r.by).collect();
        by.sort_unstable();
        assert_eq!(by, vec![1, 2]);
    }

    #[tokio::test]
    async fn room_broadcast_always_happens_once() {
        let (store, message) = stored_message().await;
        let transport = Arc::new(FakeTransport::default());
        router(FakeRegistry::default(), transport.clone(), store)
            .route(&message, &[1, 2], None)
            .await;

        let emits = transport.room_emits.lock().unwrap().clone();
        assert_eq!(emits, vec![("10".to_string(), EVENT_RECEIVE_MESSAGE.to_string())]);
    }

    #[tokio::test]
    async fn sender_socket_never_gets_an_individual_echo() {
        let (store, message) = stored_message().await;
        let transport = Arc::new(FakeTransport::default());
        let registry = FakeRegistry {
            sessions: vec![(1, "sender"), (2, "s2")],
            ..Default::default()
        };
        let report = router(registry, transport.clone(), store)
            .route(&message, &[1, 2], Some("sender"))
            .await;

        assert_eq!(*transport.direct_emits.lock().unwrap(), vec!["s2".to_string()]);
        assert_eq!(report.delivered_to, vec![1, 2]);
    }

    #[tokio::test]
    async fn offline_participants_are_not_marked() {
        let (store, message) = stored_message().await;
        let transport = Arc::new(FakeTransport {
            room: vec![("s1", 1)],
            ..Default::default()
        });
        let report = router(FakeRegistry::default(), transport.clone(), store)
            .route(&message, &[1, 2, 3], None)
            .await;

        assert!(transport.direct_emits.lock().unwrap().is_empty());
        assert_eq!(report.delivered_to, vec![1]);
    }

    #[tokio::test]
    async fn registry_failure_degrades_without_marking() {
        let (store, message) = stored_message().await;
        let transport = Arc::new(FakeTransport {
            room: vec![("s1", 1)],
            ..Default::default()
        });
        let registry = FakeRegistry {
            sessions: vec![(2, "s2")],
            fail: true,
        };
        let report = router(registry, transport.clone(), store.clone())
            .route(&message, &[1, 2], None)
            .await;

        assert!(report.degraded);
        assert_eq!(report.broadcast, 1);
        assert!(report.notified.is_empty());
        assert!(report.delivered_to.is_empty());
        assert_eq!(transport.room_emits.lock().unwrap().len(), 1);
        assert!(store.find_one(message.id).await.unwrap().delivereds.is_empty());
    }

    #[tokio::test]
    async fn unreachable_socket_does_not_fail_the_send() {
        let (store, message) = stored_message().await;
        let transport = Arc::new(FakeTransport {
            unreachable: vec!["s2"],
            ..Default::default()
        });
        let registry = FakeRegistry {
            sessions: vec![(2, "s2"), (3, "s3")],
            ..Default::default()
        };
        let report = router(registry, transport.clone(), store)
            .route(&message, &[1, 2, 3], Some("s1"))
            .await;

        assert_eq!(report.notified, vec!["s3".to_string()]);
        assert_eq!(report.delivered_to, vec![2, 3]);
        assert!(!report.degraded);
    }
}
