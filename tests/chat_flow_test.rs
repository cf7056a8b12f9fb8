//! Integration tests for presence broadcast, realtime relay, and unseen
//! accounting, driving a real server instance over HTTP and WebSocket.

use futures_util::{SinkExt, StreamExt};
use quickchat_server::ws::actor::Heartbeat;
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

type WsRead = futures_util::stream::SplitStream<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
>;
type WsWrite = futures_util::stream::SplitSink<
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
    Message,
>;

/// Start the server on a random port and return (base_url, addr).
async fn start_test_server() -> (String, SocketAddr) {
    start_server_with_heartbeat(Heartbeat::default()).await
}

async fn start_server_with_heartbeat(heartbeat: Heartbeat) -> (String, SocketAddr) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let data_dir = tmp_dir.path().to_str().unwrap().to_string();

    let db = quickchat_server::db::init_db(&data_dir).expect("Failed to init DB");
    let jwt_secret = quickchat_server::auth::jwt::load_or_generate_jwt_secret(&data_dir)
        .expect("Failed to generate JWT secret");

    let state =
        quickchat_server::state::AppState::new(db, jwt_secret).with_heartbeat(heartbeat);
    let app = quickchat_server::routes::build_router(state);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
        let _keep = tmp_dir;
    });

    let base_url = format!("http://{}", addr);
    (base_url, addr)
}

/// Sign up a user and return (token, user_id).
async fn signup(base_url: &str, full_name: &str) -> (String, String) {
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/auth/signup", base_url))
        .json(&json!({
            "fullName": full_name,
            "email": format!("{}@test.local", full_name.to_lowercase()),
            "password": "hunter2hunter2",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status(), 201, "Signup failed for {}", full_name);
    let body: serde_json::Value = resp.json().await.unwrap();
    let token = body["token"].as_str().unwrap().to_string();
    let user_id = body["user"]["id"].as_str().unwrap().to_string();
    (token, user_id)
}

/// Connect an authenticated WebSocket.
async fn connect_ws(addr: SocketAddr, token: &str) -> (WsWrite, WsRead) {
    let ws_url = format!("ws://{}/ws?token={}", addr, token);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");
    ws_stream.split()
}

/// Read frames until an event with the given name arrives; return its data.
async fn next_event(read: &mut WsRead, event: &str) -> serde_json::Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
            .await
            .unwrap_or_else(|_| panic!("Timed out waiting for '{}' event", event))
            .expect("WebSocket stream ended")
            .expect("WebSocket error");

        if let Message::Text(text) = msg {
            let value: serde_json::Value = serde_json::from_str(text.as_str()).unwrap();
            if value["event"] == event {
                return value["data"].clone();
            }
        }
    }
}

fn roster_contains(data: &serde_json::Value, user_id: &str) -> bool {
    data.as_array()
        .expect("roster payload is an array")
        .iter()
        .any(|v| v == user_id)
}

#[tokio::test]
async fn presence_roster_follows_connect_and_disconnect() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup(&base_url, "Alice").await;
    let (token_b, id_b) = signup(&base_url, "Bob").await;

    let (mut _write_a, mut read_a) = connect_ws(addr, &token_a).await;
    let roster = next_event(&mut read_a, "getOnlineUsers").await;
    assert!(roster_contains(&roster, &id_a));
    assert!(!roster_contains(&roster, &id_b));

    // Bob comes online: everyone gets the full roster
    let (mut write_b, mut read_b) = connect_ws(addr, &token_b).await;
    let roster_b = next_event(&mut read_b, "getOnlineUsers").await;
    assert!(roster_contains(&roster_b, &id_a));
    assert!(roster_contains(&roster_b, &id_b));

    let roster_a = next_event(&mut read_a, "getOnlineUsers").await;
    assert!(roster_contains(&roster_a, &id_b));

    // Bob leaves: Alice sees a roster without him
    write_b.send(Message::Close(None)).await.unwrap();
    let roster_a = next_event(&mut read_a, "getOnlineUsers").await;
    assert!(roster_contains(&roster_a, &id_a));
    assert!(!roster_contains(&roster_a, &id_b));
}

#[tokio::test]
async fn relay_fans_out_to_every_recipient_device_exactly_once() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup(&base_url, "Alice").await;
    let (token_b, id_b) = signup(&base_url, "Bob").await;

    // Bob is online on two devices
    let (mut _w1, mut device1) = connect_ws(addr, &token_b).await;
    next_event(&mut device1, "getOnlineUsers").await;
    let (mut _w2, mut device2) = connect_ws(addr, &token_b).await;
    next_event(&mut device2, "getOnlineUsers").await;

    // Alice sends via the durable-write endpoint (no WS connection needed)
    let client = reqwest::Client::new();
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, id_b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    let message_id = created["id"].as_str().unwrap();

    for device in [&mut device1, &mut device2] {
        let pushed = next_event(device, "newMessage").await;
        assert_eq!(pushed["id"], message_id);
        assert_eq!(pushed["senderId"], id_a.as_str());
        assert_eq!(pushed["receiverId"], id_b.as_str());
        assert_eq!(pushed["text"], "hi");

        // No duplicate push on the same connection
        let extra = tokio::time::timeout(Duration::from_millis(300), device.next()).await;
        assert!(extra.is_err(), "Expected exactly one push per connection");
    }
}

#[tokio::test]
async fn offline_recipient_accumulates_unseen_until_history_fetch() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup(&base_url, "Alice").await;
    let (token_b, id_b) = signup(&base_url, "Bob").await;
    let client = reqwest::Client::new();

    // Alice online, Bob offline. The send succeeds regardless.
    let (mut _write_a, mut read_a) = connect_ws(addr, &token_a).await;
    next_event(&mut read_a, "getOnlineUsers").await;

    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, id_b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Bob's contact list shows one unseen message from Alice
    let contacts: serde_json::Value = client
        .get(format!("{}/api/messages/users", base_url))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(contacts["unseenMessages"][&id_a], 1);

    // Bob logs in (registers): Alice is online, but "hi" is not re-pushed
    let (mut _write_b, mut read_b) = connect_ws(addr, &token_b).await;
    let roster = next_event(&mut read_b, "getOnlineUsers").await;
    assert!(roster_contains(&roster, &id_a));
    let retro = tokio::time::timeout(Duration::from_millis(300), read_b.next()).await;
    assert!(retro.is_err(), "No retroactive push for stored messages");

    // History fetch returns the message and resets the counter
    let history: serde_json::Value = client
        .get(format!("{}/api/messages/{}", base_url, id_a))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let messages = history["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["text"], "hi");
    assert!(history["unseenMessages"].get(&id_a).is_none());

    let contacts: serde_json::Value = client
        .get(format!("{}/api/messages/users", base_url))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(contacts["unseenMessages"].get(&id_a).is_none());
}

#[tokio::test]
async fn open_thread_suppresses_unseen_count_but_still_pushes() {
    let (base_url, addr) = start_test_server().await;
    let (token_a, id_a) = signup(&base_url, "Alice").await;
    let (token_b, id_b) = signup(&base_url, "Bob").await;
    let client = reqwest::Client::new();

    let (mut _write_b, mut read_b) = connect_ws(addr, &token_b).await;
    next_event(&mut read_b, "getOnlineUsers").await;

    // Bob opens Alice's thread (history fetch is the viewing trigger)
    let resp = client
        .get(format!("{}/api/messages/{}", base_url, id_a))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, id_b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "yo" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);

    // Bob still gets the realtime push...
    let pushed = next_event(&mut read_b, "newMessage").await;
    assert_eq!(pushed["text"], "yo");
    assert_eq!(pushed["seen"], true);

    // ...but nothing is counted as unseen
    let contacts: serde_json::Value = client
        .get(format!("{}/api/messages/users", base_url))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(contacts["unseenMessages"].get(&id_a).is_none());
}

#[tokio::test]
async fn history_fetch_without_live_connection_leaves_later_messages_unseen() {
    let (base_url, _addr) = start_test_server().await;
    let (token_a, id_a) = signup(&base_url, "Alice").await;
    let (token_b, id_b) = signup(&base_url, "Bob").await;
    let client = reqwest::Client::new();

    // Bob reads the thread over REST only, never opening a WebSocket
    let resp = client
        .get(format!("{}/api/messages/{}", base_url, id_a))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    // A message arriving later finds Bob offline, so it must count as unseen
    // even though his last fetch selected Alice's thread
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, id_b))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hi" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let created: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(created["seen"], false);

    let contacts: serde_json::Value = client
        .get(format!("{}/api/messages/users", base_url))
        .bearer_auth(&token_b)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(contacts["unseenMessages"][&id_a], 1);
}

#[tokio::test]
async fn heartbeat_reaps_connections_that_stop_responding() {
    let (base_url, addr) = start_server_with_heartbeat(Heartbeat {
        ping_interval: Duration::from_millis(150),
        pong_timeout: Duration::from_millis(150),
    })
    .await;
    let (token_a, id_a) = signup(&base_url, "Alice").await;
    let (token_b, id_b) = signup(&base_url, "Bob").await;

    let (mut _write_a, mut read_a) = connect_ws(addr, &token_a).await;
    next_event(&mut read_a, "getOnlineUsers").await;

    // Bob's client never reads its socket, so the protocol layer never
    // answers the server's pings. The TCP connection itself stays open.
    let ws_url = format!("ws://{}/ws?token={}", addr, token_b);
    let (bob_socket, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("Failed to connect to WebSocket");

    let roster = next_event(&mut read_a, "getOnlineUsers").await;
    assert!(roster_contains(&roster, &id_b));

    // The pong timeout, not TCP teardown, must take Bob off the roster.
    // next_event's own timeout bounds how long unregistration may take.
    let roster = next_event(&mut read_a, "getOnlineUsers").await;
    assert!(!roster_contains(&roster, &id_b));
    assert!(roster_contains(&roster, &id_a));

    drop(bob_socket);
}

#[tokio::test]
async fn send_validation_and_unknown_recipient() {
    let (base_url, _addr) = start_test_server().await;
    let (token_a, _id_a) = signup(&base_url, "Alice").await;
    let client = reqwest::Client::new();

    // Neither text nor image
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, "nobody"))
        .bearer_auth(&token_a)
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    // Unknown recipient
    let resp = client
        .post(format!("{}/api/messages/send/{}", base_url, "nobody"))
        .bearer_auth(&token_a)
        .json(&json!({ "text": "hello?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);
}

#[tokio::test]
async fn ws_refuses_invalid_token_before_registration() {
    let (_base_url, addr) = start_test_server().await;

    let ws_url = format!("ws://{}/ws?token=not_a_jwt", addr);
    let (ws_stream, _) = tokio_tungstenite::connect_async(&ws_url)
        .await
        .expect("WebSocket should upgrade even with an invalid token");

    let (mut _write, mut read) = ws_stream.split();

    let msg = tokio::time::timeout(Duration::from_secs(2), read.next())
        .await
        .expect("Expected close within timeout");

    match msg {
        Some(Ok(Message::Close(Some(frame)))) => {
            assert_eq!(
                frame.code,
                tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode::from(4002),
                "Expected close code 4002 (token invalid)"
            );
        }
        Some(Ok(Message::Close(None))) | None => {}
        other => {
            if let Some(Ok(msg)) = other {
                assert!(msg.is_close(), "Expected close message, got: {:?}", msg);
            }
        }
    }
}
