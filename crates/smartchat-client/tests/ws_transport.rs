//! WebSocket transport tests against an in-process Socket.IO server.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_async, WebSocketStream};

use smartchat_client::codec::{self, Handshake, Packet};
use smartchat_client::{ChatClient, ClientConfig, ConnectionState, MemoryIdentityStore};
use smartchat_core::ServerEvent;

/// Timeout for any single step.
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

// =============================================================================
// Server Helpers
// =============================================================================

async fn listen() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let endpoint = format!("http://{}", listener.local_addr().unwrap());
    (listener, endpoint)
}

/// Accept one client and complete the Engine.IO and namespace handshakes.
async fn accept(listener: &TcpListener, sid: &str) -> ServerSocket {
    let (stream, _) = timeout(STEP_TIMEOUT, listener.accept()).await.unwrap().unwrap();
    let mut socket = accept_async(stream).await.unwrap();

    let open = codec::encode_open(&Handshake {
        sid: sid.to_string(),
        ping_interval: 25000,
        ping_timeout: 20000,
    })
    .unwrap();
    socket.send(Message::Text(open)).await.unwrap();

    assert_eq!(next_text(&mut socket).await, codec::CONNECT);
    socket
        .send(Message::Text(codec::encode_connect_ack(sid)))
        .await
        .unwrap();
    socket
}

async fn next_text(socket: &mut ServerSocket) -> String {
    loop {
        match timeout(STEP_TIMEOUT, socket.next()).await.unwrap() {
            Some(Ok(Message::Text(text))) => return text,
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn next_event(socket: &mut ServerSocket) -> (String, serde_json::Value) {
    match codec::decode(&next_text(socket).await).unwrap() {
        Packet::Event { name, payload } => (name, payload),
        other => panic!("expected an event, got {other:?}"),
    }
}

async fn emit(socket: &mut ServerSocket, event: &ServerEvent) {
    socket
        .send(Message::Text(codec::encode_event(event.name(), &event.payload())))
        .await
        .unwrap();
}

fn client(endpoint: &str) -> ChatClient {
    let config = ClientConfig {
        reconnect_attempts: 3,
        reconnect_delay_ms: 20,
        ..ClientConfig::with_endpoint(endpoint)
    };
    ChatClient::websocket(config, Box::new(MemoryIdentityStore::new()))
}

async fn next_client_event(client: &mut ChatClient) -> Option<ServerEvent> {
    timeout(STEP_TIMEOUT, client.next_event()).await.unwrap()
}

// =============================================================================
// Tests
// =============================================================================

#[tokio::test]
async fn join_roundtrip_over_websocket() {
    let (listener, endpoint) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener, "s1").await;
        emit(&mut socket, &ServerEvent::Welcome { socket_id: "s1".into() }).await;

        let (name, payload) = next_event(&mut socket).await;
        assert_eq!(name, "join");
        assert_eq!(payload, json!({ "username": "alice", "room": "lobby" }));

        emit(&mut socket, &ServerEvent::Joined).await;
        emit(&mut socket, &ServerEvent::OnlineUsers(vec!["alice".into()])).await;

        let (name, payload) = next_event(&mut socket).await;
        assert_eq!(name, "chat message");
        assert_eq!(payload["message"], "hello");
        socket
    });

    let mut client = client(&endpoint);
    client.connect().await.unwrap();
    assert_eq!(client.connection_state(), ConnectionState::Connected);
    assert!(client.set_identity("alice", "lobby").is_empty());
    client.join().unwrap();

    while !client.session().is_joined() {
        next_client_event(&mut client).await.unwrap();
    }
    assert_eq!(client.session().socket_id.as_deref(), Some("s1"));

    assert_eq!(next_client_event(&mut client).await, Some(ServerEvent::OnlineUsers(vec!["alice".into()])));
    assert!(client.presence().unwrap().contains("alice"));

    client.submit("hello").unwrap();
    timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn answers_heartbeat_pings() {
    let (listener, endpoint) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener, "s1").await;
        socket.send(Message::Text(codec::PING.to_string())).await.unwrap();
        assert_eq!(next_text(&mut socket).await, codec::PONG);
    });

    let mut client = client(&endpoint);
    client.connect().await.unwrap();
    timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn refused_namespace_fails_connect() {
    let (listener, endpoint) = listen().await;
    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut socket = accept_async(stream).await.unwrap();
        let open = codec::encode_open(&Handshake {
            sid: "s1".into(),
            ping_interval: 25000,
            ping_timeout: 20000,
        })
        .unwrap();
        socket.send(Message::Text(open)).await.unwrap();
        let _ = next_text(&mut socket).await;
        socket
            .send(Message::Text(r#"44{"message":"Not authorized"}"#.to_string()))
            .await
            .unwrap();
    });

    let mut client = client(&endpoint);
    let err = client.connect().await.unwrap_err();
    assert!(err.to_string().contains("Not authorized"));
    assert_eq!(client.connection_state(), ConnectionState::Error);
}

#[tokio::test]
async fn reconnects_and_rejoins_after_drop() {
    let (listener, endpoint) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener, "s1").await;
        let (name, _) = next_event(&mut socket).await;
        assert_eq!(name, "join");
        emit(&mut socket, &ServerEvent::Joined).await;
        let _ = next_text(&mut socket).await;
        drop(socket);

        let mut socket = accept(&listener, "s2").await;
        let (name, payload) = next_event(&mut socket).await;
        assert_eq!(name, "join");
        assert_eq!(payload["room"], "lobby");
        socket
    });

    let mut client = client(&endpoint);
    client.connect().await.unwrap();
    client.set_identity("alice", "lobby");
    client.join().unwrap();
    while !client.session().is_joined() {
        next_client_event(&mut client).await.unwrap();
    }
    client.submit("still here").unwrap();

    assert_eq!(next_client_event(&mut client).await, Some(ServerEvent::Disconnect));
    assert_eq!(next_client_event(&mut client).await, Some(ServerEvent::Connect));
    assert_eq!(client.connection_state(), ConnectionState::Connected);

    timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();
}

#[tokio::test]
async fn leave_sends_notice_then_closes() {
    let (listener, endpoint) = listen().await;
    let server = tokio::spawn(async move {
        let mut socket = accept(&listener, "s1").await;
        let (name, _) = next_event(&mut socket).await;
        assert_eq!(name, "join");
        emit(&mut socket, &ServerEvent::Joined).await;

        let (name, payload) = next_event(&mut socket).await;
        assert_eq!(name, "leave");
        assert_eq!(payload, json!({ "username": "alice", "room": "lobby" }));
        assert_eq!(next_text(&mut socket).await, codec::DISCONNECT);
    });

    let mut client = client(&endpoint);
    client.connect().await.unwrap();
    client.set_identity("alice", "lobby");
    client.join().unwrap();
    while !client.session().is_joined() {
        next_client_event(&mut client).await.unwrap();
    }

    client.leave();
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    timeout(STEP_TIMEOUT, server).await.unwrap().unwrap();
}
