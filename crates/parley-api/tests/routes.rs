use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use parley_core::{AppConfig, AppState, GatewayLimits};
use serde_json::{json, Value};
use tower::ServiceExt;

const SECRET: &str = "api-test-secret";

struct TestContext {
    app: Router,
    state: AppState,
    alice: String,
    bob: String,
    carol: String,
}

impl TestContext {
    async fn new() -> anyhow::Result<Self> {
        let db = parley_db::create_pool("sqlite::memory:", 1).await?;
        parley_db::run_migrations(&db).await?;
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            let email = format!("{name}@example.com");
            parley_db::users::create_user(&db, id, name, &email, "hash").await?;
        }
        let state = AppState::new(
            db.clone(),
            AppConfig {
                jwt_secret: SECRET.to_string(),
                jwt_expiry_seconds: 3600,
                gateway: GatewayLimits::default(),
            },
        );
        let mut tokens = Vec::new();
        for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
            tokens.push(
                parley_core::auth::issue_credential(
                    &db,
                    SECRET,
                    3600,
                    id,
                    &format!("{name}@example.com"),
                    name,
                )
                .await?,
            );
        }
        let carol = tokens.pop().unwrap_or_default();
        let bob = tokens.pop().unwrap_or_default();
        let alice = tokens.pop().unwrap_or_default();
        let app = parley_api::build_router().with_state(state.clone());
        Ok(Self {
            app,
            state,
            alice,
            bob,
            carol,
        })
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> anyhow::Result<(StatusCode, Value)> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = if let Some(payload) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            builder.body(Body::from(payload.to_string()))?
        } else {
            builder.body(Body::empty())?
        };

        let response = self.app.clone().oneshot(request).await?;
        let status = response.status();
        let body_bytes = to_bytes(response.into_body(), usize::MAX).await?;
        let payload = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes)
                .unwrap_or_else(|_| json!({ "raw": String::from_utf8_lossy(&body_bytes) }))
        };
        Ok((status, payload))
    }
}

#[tokio::test]
async fn health_is_public() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, body) = ctx.request_json(Method::GET, "/health", None, None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn requests_need_a_live_credential() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, body) = ctx.request_json(Method::GET, "/api/v1/messages", None, None).await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");

    let (status, _) = ctx
        .request_json(Method::GET, "/api/v1/messages", Some("garbage"), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    parley_core::auth::revoke_credential(&ctx.state.db, 1).await?;
    let (status, _) = ctx
        .request_json(Method::GET, "/api/v1/messages", Some(&ctx.alice), None)
        .await?;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn send_then_list_and_edit() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, sent) = ctx
        .request_json(
            Method::POST,
            "/api/v1/chats/send",
            Some(&ctx.alice),
            Some(json!({"recipient": "2", "body": "Hello there"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(sent["chat"]["participants"], json!(["1", "2"]));
    assert_eq!(sent["chat"]["recipient_key"], "1_2");
    assert_eq!(sent["message"]["type"], "text");
    let message_id = sent["message"]["id"].as_str().unwrap_or_default().to_string();
    let chat_id = sent["chat"]["id"].as_str().unwrap_or_default().to_string();

    // Bob replies through the same thread.
    let (status, reply) = ctx
        .request_json(
            Method::POST,
            "/api/v1/chats/send",
            Some(&ctx.bob),
            Some(json!({"recipient": 1, "body": "hi", "reply_for_message": message_id})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(reply["chat"]["id"], chat_id);

    let (status, page) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/messages?chat_id={chat_id}&message=HELLO"),
            Some(&ctx.bob),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["list"].as_array().map(Vec::len), Some(1));
    assert_eq!(page["pagination"]["total_data"], 1);
    assert_eq!(page["pagination"]["current_page"], 1);

    // Carol is not in the chat.
    let (status, page) = ctx
        .request_json(Method::GET, "/api/v1/messages", Some(&ctx.carol), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["list"], json!([]));
    let (status, _) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/messages/{message_id}"),
            Some(&ctx.carol),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Only the sender edits.
    let (status, _) = ctx
        .request_json(
            Method::PATCH,
            &format!("/api/v1/messages/{message_id}"),
            Some(&ctx.bob),
            Some(json!({"body": "hijack"})),
        )
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, edited) = ctx
        .request_json(
            Method::PATCH,
            &format!("/api/v1/messages/{message_id}"),
            Some(&ctx.alice),
            Some(json!({"body": "Hello again", "type": "markdown"})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["body"], "Hello again");
    assert_eq!(edited["type"], "markdown");

    let (status, deleted) = ctx
        .request_json(
            Method::DELETE,
            &format!("/api/v1/messages/{message_id}"),
            Some(&ctx.alice),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["id"], message_id);
    let (status, body) = ctx
        .request_json(
            Method::GET,
            &format!("/api/v1/messages/{message_id}"),
            Some(&ctx.alice),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    Ok(())
}

#[tokio::test]
async fn invalid_send_is_bad_request() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let (status, body) = ctx
        .request_json(
            Method::POST,
            "/api/v1/chats/send",
            Some(&ctx.alice),
            Some(json!({"recipient": "2", "body": "x".repeat(5000)})),
        )
        .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_failed");
    Ok(())
}

#[tokio::test]
async fn chat_crud_and_listing() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;

    let (status, body) = ctx
        .request_json(Method::GET, "/api/v1/chats", Some(&ctx.alice), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, chat) = ctx
        .request_json(
            Method::POST,
            "/api/v1/chats",
            Some(&ctx.alice),
            Some(json!({"participants": ["2", "3"], "is_group": true, "chat_name": "Trip"})),
        )
        .await?;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(chat["participants"], json!(["1", "2", "3"]));
    let chat_id = chat["id"].as_str().unwrap_or_default().to_string();

    let (status, page) = ctx
        .request_json(
            Method::GET,
            "/api/v1/chats?participants=3&is_group=true",
            Some(&ctx.bob),
            None,
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["list"][0]["id"], chat_id);
    assert_eq!(page["pagination"]["total_data"], 1);

    let (status, renamed) = ctx
        .request_json(
            Method::PATCH,
            &format!("/api/v1/chats/{chat_id}"),
            Some(&ctx.bob),
            Some(json!({"chat_name": "Road trip", "participants": ["1", "2"]})),
        )
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(renamed["chat_name"], "Road trip");
    assert_eq!(renamed["participants"], json!(["1", "2"]));

    let (status, _) = ctx
        .request_json(Method::GET, &format!("/api/v1/chats/{chat_id}"), Some(&ctx.carol), None)
        .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = ctx
        .request_json(Method::DELETE, &format!("/api/v1/chats/{chat_id}"), Some(&ctx.alice), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = ctx
        .request_json(Method::GET, &format!("/api/v1/chats/{chat_id}"), Some(&ctx.alice), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn profile_derives_age_and_signs() -> anyhow::Result<()> {
    let ctx = TestContext::new().await?;
    let interests = vec!["chess".to_string()];
    parley_db::users::upsert_profile(
        &ctx.state.db,
        2,
        parley_db::users::ProfileInput {
            display_name: Some("Bob"),
            birthday: chrono::NaiveDate::from_ymd_opt(1997, 3, 25),
            interests: &interests,
            ..Default::default()
        },
    )
    .await?;

    let (status, profile) = ctx
        .request_json(Method::GET, "/api/v1/users/2/profile", Some(&ctx.alice), None)
        .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile["user_id"], "2");
    assert_eq!(profile["display_name"], "Bob");
    assert_eq!(profile["horoscope"], "aries");
    assert_eq!(profile["zodiac"], "ox");
    assert!(profile["age"].as_i64().unwrap_or_default() >= 29);

    let (status, _) = ctx
        .request_json(Method::GET, "/api/v1/users/999/profile", Some(&ctx.alice), None)
        .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}
