use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use parley_core::auth::authenticate;
use parley_core::error::CoreError;
use parley_core::hub::OutboundFrame;
use parley_core::transport::{chat_room, Transport};
use parley_core::AppState;
use parley_models::gateway::{EVENT_PONG, EVENT_RECEIVE_MESSAGE};
use parley_models::message::MessagePatch;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::limits::{ConnectionGuard, GatewayControl};
use crate::protocol::{self, ClientEvent, CODE_RATE_LIMITED};
use crate::session::GatewaySession;

const PING_INTERVAL: Duration = Duration::from_secs(20);
const IDLE_TIMEOUT: Duration = Duration::from_secs(90);

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_POLICY: u16 = 1008;
const CLOSE_INTERNAL: u16 = 1011;
const CLOSE_TRY_AGAIN: u16 = 1013;
const CLOSE_UNAUTHORIZED: u16 = 4001;

async fn send_ws_text_logged(
    sender: &mut (impl SinkExt<Message> + Unpin),
    payload: String,
    user_id: i64,
    frame_type: &str,
) -> Result<(), ()> {
    tracing::trace!(user_id, frame_type, bytes = payload.len(), "gateway out");
    sender
        .send(Message::Text(payload.into()))
        .await
        .map_err(|_| ())
}

async fn send_ws_close_logged(
    sender: &mut (impl SinkExt<Message> + Unpin),
    code: u16,
    reason: &str,
    user_id: Option<i64>,
) -> Result<(), ()> {
    tracing::debug!(?user_id, code, reason, "gateway close");
    sender
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.to_string().into(),
        })))
        .await
        .map_err(|_| ())
}

pub async fn handle_connection(
    socket: WebSocket,
    state: AppState,
    control: Arc<GatewayControl>,
    token: Option<String>,
) {
    let mut guard = ConnectionGuard::new(control.clone());
    let (mut sender, receiver) = socket.split();

    if !guard.acquire_global() {
        let _ = send_ws_close_logged(
            &mut sender,
            CLOSE_TRY_AGAIN,
            "Gateway is at connection capacity",
            None,
        )
        .await;
        return;
    }

    let identity = match token {
        Some(token) => authenticate(state.auth.as_ref(), &token).await,
        None => Err(CoreError::Unauthorized),
    };
    let identity = match identity {
        Ok(identity) => identity,
        Err(err) => {
            if !matches!(err, CoreError::Unauthorized) {
                tracing::error!("gateway authentication failed: {}", err);
            }
            let _ =
                send_ws_close_logged(&mut sender, CLOSE_UNAUTHORIZED, "unauthorized", None).await;
            return;
        }
    };

    if !guard.acquire_user(identity.user_id) {
        let _ = send_ws_close_logged(
            &mut sender,
            CLOSE_POLICY,
            "Too many concurrent sessions for this user",
            Some(identity.user_id),
        )
        .await;
        return;
    }

    let mut session = GatewaySession::new(identity);
    let outbound = state.hub.attach(&session.socket_id, session.user_id());
    if let Err(err) = state
        .sessions
        .register(session.user_id(), &session.socket_id)
        .await
    {
        tracing::error!(
            user_id = session.user_id(),
            "failed to register socket session: {}",
            err
        );
        state.hub.detach(&session.socket_id);
        let _ = send_ws_close_logged(
            &mut sender,
            CLOSE_INTERNAL,
            "session registration failed",
            Some(session.user_id()),
        )
        .await;
        return;
    }
    tracing::info!(
        user_id = session.user_id(),
        socket_id = %session.socket_id,
        "Client {} connected",
        session.identity.username
    );

    let (reason, idle) =
        run_session(sender, receiver, &mut session, outbound, &state, &control).await;
    if idle {
        tracing::warn!("Client {} disconnected: {}", session.user_id(), reason);
    } else {
        tracing::info!("Client {} disconnected: {}", session.user_id(), reason);
    }

    // A newer connection may already own the registry entry; then this is a no-op.
    if let Err(err) = state.sessions.unregister_by_socket(&session.socket_id).await {
        tracing::warn!(
            user_id = session.user_id(),
            socket_id = %session.socket_id,
            "failed to unregister socket session: {}",
            err
        );
    }
    state.hub.detach(&session.socket_id);
}

async fn run_session(
    mut sender: impl SinkExt<Message> + Unpin,
    mut receiver: impl StreamExt<Item = Result<Message, axum::Error>> + Unpin,
    session: &mut GatewaySession,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    state: &AppState,
    control: &GatewayControl,
) -> (String, bool) {
    let user_id = session.user_id();
    let mut ws_ping_interval = tokio::time::interval(PING_INTERVAL);
    ws_ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let idle_sleep = tokio::time::sleep(IDLE_TIMEOUT);
    tokio::pin!(idle_sleep);

    loop {
        tokio::select! {
            msg = receiver.next() => {
                idle_sleep.as_mut().reset(Instant::now() + IDLE_TIMEOUT);
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply =
                            handle_client_message(text.as_str(), session, state, control).await;
                        if let Some(reply) = reply {
                            if send_ws_text_logged(&mut sender, reply, user_id, "reply")
                                .await
                                .is_err()
                            {
                                return ("websocket send error".to_string(), false);
                            }
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        tracing::debug!(user_id, "ignoring binary frame");
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | None => {
                        return ("client closed connection".to_string(), false);
                    }
                    Some(Err(err)) => {
                        return (format!("websocket receive error: {err}"), false);
                    }
                }
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    return ("outbound queue closed".to_string(), false);
                };
                if send_ws_text_logged(&mut sender, frame.to_string(), user_id, "event")
                    .await
                    .is_err()
                {
                    return ("websocket send error".to_string(), false);
                }
            }
            () = &mut idle_sleep => {
                let _ = send_ws_close_logged(
                    &mut sender,
                    CLOSE_NORMAL,
                    "idle timeout",
                    Some(user_id),
                )
                .await;
                return (format!("idle timeout after {}s", IDLE_TIMEOUT.as_secs()), true);
            }
            _ = ws_ping_interval.tick() => {
                if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return ("websocket ping send error".to_string(), false);
                }
            }
        }
    }
}

/// Returns the frame to write back, if any. Frames without an ack id get no
/// acknowledgment; their failures are only logged.
async fn handle_client_message(
    text: &str,
    session: &mut GatewaySession,
    state: &AppState,
    control: &GatewayControl,
) -> Option<String> {
    let user_id = session.user_id();
    let frame = match protocol::parse_frame(text) {
        Ok(frame) => frame,
        Err(err) => {
            tracing::debug!(user_id, "dropping frame: {}", err);
            return None;
        }
    };
    let ack = frame.ack;

    let event = match protocol::decode_event(&frame) {
        Ok(event) => event,
        Err(err) => return reply_error(ack, user_id, &frame.event, &err),
    };

    tracing::debug!(user_id, event = event.name(), ack = ?ack, "gateway event");

    if !matches!(event, ClientEvent::Ping) {
        if let Err(retry_after_ms) = control.check_rate(user_id) {
            tracing::debug!(user_id, event = event.name(), retry_after_ms, "rate limited");
            let ack = ack?;
            return encoded(protocol::ack_rejected(
                ack,
                CODE_RATE_LIMITED,
                format!("retry after {retry_after_ms}ms"),
            ));
        }
    }

    let name = event.name();
    let is_ping = matches!(event, ClientEvent::Ping);
    match dispatch(event, session, state).await {
        Ok(data) => match ack {
            Some(ack) => encoded(protocol::ack_ok(ack, data)),
            None if is_ping => encoded(protocol::event_frame(EVENT_PONG, data)),
            None => None,
        },
        Err(err) => reply_error(ack, user_id, name, &err),
    }
}

async fn dispatch(
    event: ClientEvent,
    session: &mut GatewaySession,
    state: &AppState,
) -> Result<Value, CoreError> {
    let user_id = session.user_id();
    match event {
        ClientEvent::Ping => Ok(Value::String(EVENT_PONG.to_string())),
        ClientEvent::JoinChatRoom(payload) => {
            let chat_id = payload.chat_id();
            state
                .hub
                .join(&session.socket_id, &chat_room(chat_id))
                .await
                .map_err(|err| CoreError::Internal(err.to_string()))?;
            if session.join(chat_id) {
                tracing::debug!(user_id, chat_id, "joined chat room");
            }
            Ok(Value::Bool(true))
        }
        ClientEvent::SendMessage(payload) => {
            let (sent, report) = state
                .send_message(payload, user_id, Some(&session.socket_id))
                .await?;
            tracing::debug!(
                user_id,
                chat_id = sent.chat.id,
                message_id = sent.message.id,
                event = EVENT_RECEIVE_MESSAGE,
                broadcast = report.broadcast,
                notified = report.notified.len(),
                degraded = report.degraded,
                "message routed"
            );
            Ok(Value::Bool(true))
        }
        ClientEvent::UpdateMessage(payload) => {
            let patch = MessagePatch {
                body: payload.body,
                message_type: payload.message_type,
                attachments: payload.attachments,
            };
            state.update_message(payload.message_id, patch).await?;
            Ok(Value::Bool(true))
        }
        ClientEvent::ReadMessage(payload) => {
            state.read_message(payload.message_id(), user_id).await?;
            Ok(Value::Bool(true))
        }
    }
}

fn reply_error(ack: Option<u64>, user_id: i64, event: &str, err: &CoreError) -> Option<String> {
    match err {
        CoreError::Storage(_) | CoreError::Internal(_) => {
            tracing::error!(user_id, event, "gateway event failed: {:?}", err);
        }
        _ => tracing::debug!(user_id, event, "gateway event rejected: {}", err),
    }
    encoded(protocol::ack_error(ack?, err))
}

fn encoded(frame: Result<String, serde_json::Error>) -> Option<String> {
    match frame {
        Ok(text) => Some(text),
        Err(err) => {
            tracing::error!("failed to encode gateway frame: {}", err);
            None
        }
    }
}
