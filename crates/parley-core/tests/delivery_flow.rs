use parley_core::hub::OutboundFrame;
use parley_core::sessions::SessionRegistry;
use parley_core::transport::{chat_room, Transport};
use parley_core::{AppConfig, AppState, GatewayLimits};
use parley_models::gateway::SendMessagePayload;
use parley_models::message::MessagePatch;
use serde_json::Value;
use tokio::sync::mpsc::Receiver;

async fn state() -> anyhow::Result<AppState> {
    let pool = parley_db::create_pool("sqlite::memory:", 1).await?;
    parley_db::run_migrations(&pool).await?;
    for (id, name) in [(1, "alice"), (2, "bob"), (3, "carol")] {
        let email = format!("{name}@example.com");
        parley_db::users::create_user(&pool, id, name, &email, "hash").await?;
    }
    Ok(AppState::new(
        pool,
        AppConfig {
            jwt_secret: "secret".into(),
            jwt_expiry_seconds: 60,
            gateway: GatewayLimits::default(),
        },
    ))
}

fn drain(rx: &mut Receiver<OutboundFrame>) -> Vec<Value> {
    let mut out = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        out.push(serde_json::from_str(&frame).unwrap());
    }
    out
}

#[tokio::test]
async fn send_reaches_room_and_connected_recipient() -> anyhow::Result<()> {
    let state = state().await?;
    let mut alice_rx = state.hub.attach("alice-sock", 1);
    let mut bob_rx = state.hub.attach("bob-sock", 2);
    state.sessions.register(1, "alice-sock").await?;
    state.sessions.register(2, "bob-sock").await?;

    let payload = SendMessagePayload {
        recipient: "2".into(),
        body: "hi".into(),
        ..Default::default()
    };
    let (sent, report) = state.send_message(payload, 1, Some("alice-sock")).await?;
    assert_eq!(sent.chat.participants, vec![1, 2]);
    assert_eq!(sent.message.body, "hi");
    assert_eq!(report.notified, vec!["bob-sock".to_string()]);
    assert_eq!(report.delivered_to, vec![1, 2]);

    let bob_frames = drain(&mut bob_rx);
    assert_eq!(bob_frames.len(), 1);
    assert_eq!(bob_frames[0]["event"], "receive_message");
    assert_eq!(bob_frames[0]["data"]["body"], "hi");
    assert!(drain(&mut alice_rx).is_empty());

    // Once both sit in the room, the broadcast covers them and nobody is
    // notified individually.
    let room = chat_room(sent.chat.id);
    state.hub.join("alice-sock", &room).await?;
    state.hub.join("bob-sock", &room).await?;
    let payload = SendMessagePayload {
        recipient: "1".into(),
        body: "back".into(),
        ..Default::default()
    };
    let (_, report) = state.send_message(payload, 2, Some("bob-sock")).await?;
    assert_eq!(report.broadcast, 2);
    assert!(report.notified.is_empty());
    assert_eq!(drain(&mut alice_rx).len(), 1);
    assert_eq!(drain(&mut bob_rx).len(), 1);
    Ok(())
}

#[tokio::test]
async fn update_broadcasts_to_room_only() -> anyhow::Result<()> {
    let state = state().await?;
    let payload = SendMessagePayload {
        recipient: "2".into(),
        body: "draft".into(),
        ..Default::default()
    };
    let (sent, _) = state.send_message(payload, 1, None).await?;

    let mut watcher_rx = state.hub.attach("watcher", 1);
    let mut outside_rx = state.hub.attach("outside", 2);
    state.sessions.register(2, "outside").await?;
    state.hub.join("watcher", &chat_room(sent.chat.id)).await?;

    let updated = state
        .update_message(
            sent.message.id,
            MessagePatch {
                body: Some("final".into()),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.body, "final");

    let frames = drain(&mut watcher_rx);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["event"], "message_updated");
    assert_eq!(frames[0]["data"]["body"], "final");
    assert!(drain(&mut outside_rx).is_empty());
    Ok(())
}

#[tokio::test]
async fn read_marks_only_the_reader() -> anyhow::Result<()> {
    let state = state().await?;
    state.sessions.register(2, "bob-sock").await?;
    let _bob_rx = state.hub.attach("bob-sock", 2);
    let payload = SendMessagePayload {
        recipient: "2".into(),
        body: "hello".into(),
        ..Default::default()
    };
    let (sent, _) = state.send_message(payload, 1, None).await?;

    state.read_message(sent.message.id, 3).await?;
    let message = state.messages().find_one(sent.message.id).await?;
    assert_eq!(message.reads.len(), 1);
    assert_eq!(message.reads[0].by, 3);
    assert_eq!(message.delivereds.len(), 1);
    assert_eq!(message.delivereds[0].by, 2);
    Ok(())
}
