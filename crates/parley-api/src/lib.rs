use axum::{
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use parley_core::AppState;
use serde_json::json;

pub mod error;
pub mod middleware;
pub mod routes;

pub fn build_router() -> Router<AppState> {
    let cors = build_cors_layer();
    Router::new()
        // Health
        .route("/health", get(health))
        .route("/api/v1/health", get(health))
        // Chats
        .route(
            "/api/v1/chats",
            get(routes::chats::list_my_chats).post(routes::chats::create_chat),
        )
        .route("/api/v1/chats/send", post(routes::chats::send_message))
        .route(
            "/api/v1/chats/{chat_id}",
            get(routes::chats::get_chat)
                .patch(routes::chats::update_chat)
                .delete(routes::chats::delete_chat),
        )
        // Messages
        .route("/api/v1/messages", get(routes::messages::list_messages))
        .route(
            "/api/v1/messages/{message_id}",
            get(routes::messages::get_message)
                .patch(routes::messages::update_message)
                .delete(routes::messages::delete_message),
        )
        // Users
        .route(
            "/api/v1/users/{user_id}/profile",
            get(routes::users::get_profile),
        )
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn build_cors_layer() -> tower_http::cors::CorsLayer {
    tower_http::cors::CorsLayer::new()
        .allow_origin(tower_http::cors::Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers(tower_http::cors::Any)
}

async fn health() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "status": "ok", "service": "parley" })),
    )
}
