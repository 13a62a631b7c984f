//! In-process room hub. Each attached connection owns a bounded outbound
//! queue drained by its gateway task; rooms are sets of connection ids.

use async_trait::async_trait;
use dashmap::DashMap;
use parley_models::gateway::ServerEvent;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::transport::{RoomConnection, Transport, TransportError};

/// Pre-encoded text frame.
pub type OutboundFrame = Arc<str>;

struct ConnectionEntry {
    user_id: i64,
    tx: mpsc::Sender<OutboundFrame>,
    rooms: HashSet<String>,
}

pub struct SocketHub {
    connections: DashMap<String, ConnectionEntry>,
    rooms: DashMap<String, HashSet<String>>,
    buffer: usize,
}

impl SocketHub {
    pub fn new(buffer: usize) -> Self {
        Self {
            connections: DashMap::new(),
            rooms: DashMap::new(),
            buffer: buffer.max(1),
        }
    }

    /// Registers a live connection and returns the receiving end of its
    /// outbound queue.
    pub fn attach(&self, connection_id: &str, user_id: i64) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(self.buffer);
        self.connections.insert(
            connection_id.to_string(),
            ConnectionEntry {
                user_id,
                tx,
                rooms: HashSet::new(),
            },
        );
        rx
    }

    /// Drops the connection and its room memberships. Returns the rooms it
    /// was in.
    pub fn detach(&self, connection_id: &str) -> Vec<String> {
        let Some((_, entry)) = self.connections.remove(connection_id) else {
            return Vec::new();
        };
        let mut left: Vec<String> = entry.rooms.into_iter().collect();
        left.sort();
        for room in &left {
            let now_empty = match self.rooms.get_mut(room) {
                Some(mut members) => {
                    members.remove(connection_id);
                    members.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.rooms.remove_if(room, |_, members| members.is_empty());
            }
        }
        left
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn is_attached(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn rooms_of(&self, connection_id: &str) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .connections
            .get(connection_id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default();
        rooms.sort();
        rooms
    }

    fn encode(event: &str, payload: &serde_json::Value) -> Result<OutboundFrame, TransportError> {
        let text = serde_json::to_string(&ServerEvent { event, data: payload })?;
        Ok(Arc::from(text))
    }

    fn push(&self, connection_id: &str, frame: OutboundFrame) -> Result<(), TransportError> {
        let tx = self
            .connections
            .get(connection_id)
            .map(|entry| entry.tx.clone())
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))?;
        tx.try_send(frame).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => {
                TransportError::Backpressure(connection_id.to_string())
            }
            mpsc::error::TrySendError::Closed(_) => {
                TransportError::Closed(connection_id.to_string())
            }
        })
    }
}

impl Default for SocketHub {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Transport for SocketHub {
    async fn join(&self, connection_id: &str, room: &str) -> Result<(), TransportError> {
        // The entry guard is held across the room insert so a concurrent
        // detach cannot strand this id in `rooms`.
        let mut entry = self
            .connections
            .get_mut(connection_id)
            .ok_or_else(|| TransportError::UnknownConnection(connection_id.to_string()))?;
        entry.rooms.insert(room.to_string());
        self.rooms
            .entry(room.to_string())
            .or_default()
            .insert(connection_id.to_string());
        drop(entry);
        Ok(())
    }

    async fn emit_to_room(
        &self,
        room: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<usize, TransportError> {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(members) => members.iter().cloned().collect(),
            None => return Ok(0),
        };
        let frame = Self::encode(event, payload)?;
        let mut queued = 0;
        for connection_id in members {
            match self.push(&connection_id, frame.clone()) {
                Ok(()) => queued += 1,
                Err(err) => {
                    tracing::warn!(
                        room,
                        event,
                        connection_id = %connection_id,
                        "room emit skipped: {}",
                        err
                    );
                }
            }
        }
        Ok(queued)
    }

    async fn emit_to_connection(
        &self,
        connection_id: &str,
        event: &str,
        payload: &serde_json::Value,
    ) -> Result<(), TransportError> {
        let frame = Self::encode(event, payload)?;
        self.push(connection_id, frame)
    }

    async fn list_connections_in_room(
        &self,
        room: &str,
    ) -> Result<Vec<RoomConnection>, TransportError> {
        let members: Vec<String> = match self.rooms.get(room) {
            Some(members) => members.iter().cloned().collect(),
            None => return Ok(Vec::new()),
        };
        let mut out: Vec<RoomConnection> = members
            .into_iter()
            .filter_map(|connection_id| {
                let user_id = self.connections.get(&connection_id)?.user_id;
                Some(RoomConnection {
                    connection_id,
                    user_id,
                })
            })
            .collect();
        out.sort_by(|a, b| a.connection_id.cmp(&b.connection_id));
        Ok(out)
    }
}
