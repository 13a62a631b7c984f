mod handler;
mod limits;
pub mod protocol;
mod session;

use axum::{
    extract::{ws::WebSocketUpgrade, Query, State},
    http::{header, HeaderMap},
    response::IntoResponse,
    routing::get,
    Extension, Router,
};
use parley_core::{AppState, GatewayLimits};
use serde::Deserialize;
use std::sync::Arc;

pub use limits::GatewayControl;

/// Mounts the realtime gateway at `/gateway`.
pub fn gateway_router(limits: GatewayLimits) -> Router<AppState> {
    let control = Arc::new(GatewayControl::new(limits));
    limits::spawn_rate_limit_pruning(&control);
    Router::new()
        .route("/gateway", get(ws_upgrade))
        .layer(Extension(control))
}

#[derive(Debug, Default, Deserialize)]
struct GatewayQuery {
    token: Option<String>,
}

async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Extension(control): Extension<Arc<GatewayControl>>,
    headers: HeaderMap,
    Query(query): Query<GatewayQuery>,
) -> impl IntoResponse {
    let token = bearer_token(&headers).or(query.token);
    ws.on_upgrade(move |socket| handler::handle_connection(socket, state, control, token))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
