use std::net::SocketAddr;
use std::time::{Duration, Instant};

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{any, post};
use axum::{Json, Router};
use nibot_chat::conn::{Connection, ConnectionConfig, ConnectionState, SendError};
use nibot_chat::wire::{generate_session_id, InboundKind, Outbound};
use tokio::sync::watch;
use url::Url;

fn config_for(addr: SocketAddr) -> ConnectionConfig {
    ConnectionConfig {
        ws_url: Url::parse(&format!("ws://{}/ws", addr)).unwrap(),
        http_url: Url::parse(&format!("http://{}/api/chat", addr)).unwrap(),
        backoff_base: Duration::from_millis(50),
        backoff_cap: Duration::from_millis(200),
    }
}

/// Echo backend: replies to every envelope with an assistant message over
/// either transport.
fn echo_router() -> Router {
    async fn ws_handler(ws: WebSocketUpgrade) -> Response {
        ws.on_upgrade(handle_socket)
    }

    async fn handle_socket(mut socket: WebSocket) {
        while let Some(Ok(message)) = socket.recv().await {
            if let Message::Text(text) = message {
                let envelope: Outbound = serde_json::from_str(text.as_str()).unwrap();
                assert!(envelope.session_id.starts_with("session_"));
                let reply = serde_json::json!({
                    "type": "assistant",
                    "content": format!("echo: {}", envelope.message),
                });
                if socket
                    .send(Message::Text(reply.to_string().into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
        }
    }

    async fn chat_handler(Json(envelope): Json<Outbound>) -> Json<serde_json::Value> {
        Json(serde_json::json!({
            "type": "assistant",
            "content": format!("http echo: {}", envelope.message),
        }))
    }

    Router::new()
        .route("/ws", any(ws_handler))
        .route("/api/chat", post(chat_handler))
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}

/// A port with nothing listening on it, so channel dials fail fast.
async fn free_addr() -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Record the instant of the next `count` observations of `wanted`. The
/// state is held across the backoff sleep, so observations line up with the
/// transitions even when the watch coalesces intermediate values.
async fn stamp_states(
    rx: &mut watch::Receiver<ConnectionState>,
    wanted: ConnectionState,
    count: usize,
) -> Vec<Instant> {
    tokio::time::timeout(Duration::from_secs(10), async {
        let mut stamps = Vec::with_capacity(count);
        while stamps.len() < count {
            rx.changed().await.unwrap();
            if *rx.borrow_and_update() == wanted {
                stamps.push(Instant::now());
            }
        }
        stamps
    })
    .await
    .unwrap_or_else(|_| panic!("fewer than {} observations of {:?}", count, wanted))
}

async fn wait_for_state(rx: &mut watch::Receiver<ConnectionState>, wanted: ConnectionState) {
    tokio::time::timeout(Duration::from_secs(10), async {
        while *rx.borrow_and_update() != wanted {
            rx.changed().await.unwrap();
        }
    })
    .await
    .unwrap_or_else(|_| panic!("never reached {:?}", wanted));
}

#[tokio::test]
async fn channel_round_trip() {
    let addr = serve(echo_router()).await;
    let (conn, mut inbound_rx) = Connection::spawn(config_for(addr), generate_session_id());

    let mut state_rx = conn.watch_state();
    wait_for_state(&mut state_rx, ConnectionState::Connected).await;

    conn.send("hello").await.unwrap();
    let inbound = tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv())
        .await
        .expect("no reply in time")
        .unwrap();
    assert_eq!(inbound.kind, InboundKind::Assistant);
    assert_eq!(inbound.content, "echo: hello");
}

#[tokio::test]
async fn http_fallback_when_channel_down() {
    // The http endpoint is served, but the channel dial goes to a dead port.
    let http_addr = serve(echo_router()).await;
    let dead = free_addr().await;
    let config = ConnectionConfig {
        ws_url: Url::parse(&format!("ws://{}/ws", dead)).unwrap(),
        ..config_for(http_addr)
    };
    let (conn, mut inbound_rx) = Connection::spawn(config, generate_session_id());

    let mut state_rx = conn.watch_state();
    wait_for_state(&mut state_rx, ConnectionState::Disconnected).await;

    conn.send("hello").await.unwrap();
    let inbound = tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv())
        .await
        .expect("no fallback reply in time")
        .unwrap();
    assert_eq!(inbound.kind, InboundKind::Assistant);
    assert_eq!(inbound.content, "http echo: hello");
}

#[tokio::test]
async fn http_failure_surfaces_error_without_state_change() {
    async fn chat_fail() -> StatusCode {
        StatusCode::INTERNAL_SERVER_ERROR
    }
    let router = Router::new().route("/api/chat", post(chat_fail));
    let addr = serve(router).await;
    // No /ws route responds to upgrades here either way; point the dial at a
    // dead port so the state settles quickly.
    let dead = free_addr().await;
    let config = ConnectionConfig {
        ws_url: Url::parse(&format!("ws://{}/ws", dead)).unwrap(),
        ..config_for(addr)
    };
    let (conn, mut inbound_rx) = Connection::spawn(config, generate_session_id());

    let mut state_rx = conn.watch_state();
    wait_for_state(&mut state_rx, ConnectionState::Disconnected).await;

    let err = conn.send("hello").await.unwrap_err();
    assert!(matches!(err, SendError::Status(500)));
    // A fallback failure never mutates the connection state and delivers no
    // inbound message.
    assert_eq!(conn.state(), ConnectionState::Disconnected);
    assert!(inbound_rx.try_recv().is_err());
}

#[tokio::test]
async fn nudge_triggers_immediate_reconnect() {
    // Reserve an address, start the client against it before any server
    // exists, then bring the server up and nudge.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let mut config = config_for(addr);
    // A long timer proves the nudge, not the timer, drove the reconnect.
    config.backoff_base = Duration::from_secs(60);
    config.backoff_cap = Duration::from_secs(60);
    let (conn, mut inbound_rx) = Connection::spawn(config, generate_session_id());

    let mut state_rx = conn.watch_state();
    wait_for_state(&mut state_rx, ConnectionState::Disconnected).await;

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    tokio::spawn(async move {
        axum::serve(listener, echo_router()).await.unwrap();
    });

    conn.nudge();
    wait_for_state(&mut state_rx, ConnectionState::Connected).await;

    conn.send("back").await.unwrap();
    let inbound = tokio::time::timeout(Duration::from_secs(5), inbound_rx.recv())
        .await
        .expect("no reply after reconnect")
        .unwrap();
    assert_eq!(inbound.content, "echo: back");
}

#[tokio::test]
async fn backoff_doubles_until_the_cap() {
    // Every dial fails, so consecutive Disconnected observations are spaced
    // by the reconnect delay.
    let dead = free_addr().await;
    let mut config = config_for(dead);
    config.backoff_base = Duration::from_millis(100);
    config.backoff_cap = Duration::from_millis(400);
    let (conn, _inbound_rx) = Connection::spawn(config, generate_session_id());

    let mut state_rx = conn.watch_state();
    let stamps = stamp_states(&mut state_rx, ConnectionState::Disconnected, 5).await;
    let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();

    // 100ms, 200ms, then pinned at the 400ms cap.
    assert!(gaps[0] >= Duration::from_millis(100), "gaps: {:?}", gaps);
    assert!(gaps[1] >= Duration::from_millis(200), "gaps: {:?}", gaps);
    assert!(gaps[2] >= Duration::from_millis(400), "gaps: {:?}", gaps);
    assert!(gaps[3] >= Duration::from_millis(400), "gaps: {:?}", gaps);
    // An uncapped delay would have doubled to 800ms here.
    assert!(gaps[3] < Duration::from_millis(700), "gaps: {:?}", gaps);
}

#[tokio::test]
async fn backoff_resets_after_successful_connect() {
    // A backend that accepts the channel, holds it briefly, and drops it.
    // Each successful connect must reset the delay to the base, so the
    // connect cadence stays flat instead of doubling.
    let hold = Duration::from_millis(50);
    let router = Router::new().route(
        "/ws",
        any(move |ws: WebSocketUpgrade| async move {
            ws.on_upgrade(move |socket| async move {
                tokio::time::sleep(hold).await;
                drop(socket);
            })
        }),
    );
    let addr = serve(router).await;
    let mut config = config_for(addr);
    config.backoff_base = Duration::from_millis(100);
    config.backoff_cap = Duration::from_millis(800);
    let (conn, _inbound_rx) = Connection::spawn(config, generate_session_id());

    let mut state_rx = conn.watch_state();
    let stamps = stamp_states(&mut state_rx, ConnectionState::Connected, 5).await;
    let gaps: Vec<Duration> = stamps.windows(2).map(|w| w[1] - w[0]).collect();

    for gap in &gaps {
        // Hold plus base delay is about 150ms per cycle; a delay that kept
        // doubling would push later gaps past 450ms.
        assert!(*gap >= Duration::from_millis(100), "gaps: {:?}", gaps);
        assert!(*gap < Duration::from_millis(400), "gaps: {:?}", gaps);
    }
}

#[tokio::test]
async fn shutdown_stops_the_connection_task() {
    let dead = free_addr().await;
    let (conn, _inbound_rx) = Connection::spawn(config_for(dead), generate_session_id());
    let mut state_rx = conn.watch_state();

    conn.shutdown();

    // The task exiting drops the watch sender; changed() then errors.
    tokio::time::timeout(Duration::from_secs(5), async {
        while state_rx.changed().await.is_ok() {}
    })
    .await
    .expect("connection task kept running after shutdown");
}
