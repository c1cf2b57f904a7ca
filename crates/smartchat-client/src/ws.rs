//! WebSocket transport speaking Socket.IO v4.
//!
//! `connect` completes the Engine.IO and namespace handshakes before it
//! returns, then hands the socket to a supervisor task. The task forwards
//! outbound events, answers heartbeats, decodes inbound events and, when the
//! socket drops, reports `Disconnected` and retries until it reconnects or
//! runs out of attempts.
//!
//! Endpoint: WS /socket.io/?EIO=4&transport=websocket

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use smartchat_core::{ClientEvent, ServerEvent};

use crate::codec::{self, Packet};
use crate::config::ConnectOptions;
use crate::connection::{Connector, TransportError, TransportEvent, TransportLink};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Socket.IO path and query appended to the endpoint.
const SOCKET_PATH: &str = "/socket.io/?EIO=4&transport=websocket";

/// Time allowed for the socket and namespace handshakes.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to a Socket.IO server over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(
        &self,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<TransportLink, TransportError> {
        let url = socket_url(endpoint)?;
        let socket = open_socket(&url).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(options.inbound_buffer.max(1));

        tokio::spawn(supervise(socket, url, options.clone(), outbound_rx, event_tx));

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: event_rx,
        })
    }
}

/// Turn an `http(s)` or `ws(s)` endpoint into a Socket.IO WebSocket URL.
///
/// # Errors
///
/// Returns an error for any other scheme.
pub fn socket_url(endpoint: &str) -> Result<String, TransportError> {
    let (scheme, rest) = endpoint
        .split_once("://")
        .ok_or_else(|| TransportError::InvalidEndpoint(endpoint.to_string()))?;

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(TransportError::InvalidEndpoint(endpoint.to_string())),
    };

    if rest.contains("/socket.io") {
        return Ok(format!("{scheme}://{rest}"));
    }
    let host = rest.trim_end_matches('/');
    if host.is_empty() {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
    }
    Ok(format!("{scheme}://{host}{SOCKET_PATH}"))
}

/// Open the socket and join the default namespace.
async fn open_socket(url: &str) -> Result<WsStream, TransportError> {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, handshake(url)).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Handshake("timed out".to_string())),
    }
}

async fn handshake(url: &str) -> Result<WsStream, TransportError> {
    let (mut socket, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))?;

    let open = loop {
        if let Packet::Open(open) = next_packet(&mut socket).await? {
            break open;
        }
    };
    tracing::debug!(sid = %open.sid, ping_interval = open.ping_interval, "Engine.IO session opened");

    send_frame(&mut socket, codec::CONNECT.to_string()).await?;

    loop {
        match next_packet(&mut socket).await? {
            Packet::Connect(_) => break,
            Packet::ConnectError(message) => return Err(TransportError::Handshake(message)),
            Packet::Ping => send_frame(&mut socket, codec::PONG.to_string()).await?,
            other => tracing::debug!(packet = ?other, "Ignoring packet during handshake"),
        }
    }

    tracing::debug!(url = %url, "Socket.IO namespace connected");
    Ok(socket)
}

async fn next_packet(socket: &mut WsStream) -> Result<Packet, TransportError> {
    loop {
        match socket.next().await {
            Some(Ok(Message::Text(text))) => {
                return codec::decode(&text).map_err(|e| TransportError::Handshake(e.to_string()));
            }
            Some(Ok(Message::Close(_))) | None => {
                return Err(TransportError::Handshake("closed during handshake".to_string()));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(TransportError::Connection(e.to_string())),
        }
    }
}

async fn send_frame(socket: &mut WsStream, frame: String) -> Result<(), TransportError> {
    socket
        .send(Message::Text(frame))
        .await
        .map_err(|e| TransportError::Connection(e.to_string()))
}

/// Why a socket stopped being pumped.
enum LinkEnd {
    /// The client dropped its side of the link.
    Closed,
    /// The socket failed or the server closed it.
    Dropped(String),
    /// The server disconnected the namespace. No reconnect.
    Kicked,
}

/// Task that owns the socket for the lifetime of the link.
async fn supervise(
    mut socket: WsStream,
    url: String,
    options: ConnectOptions,
    mut outbound: mpsc::UnboundedReceiver<ClientEvent>,
    events: mpsc::Sender<TransportEvent>,
) {
    loop {
        match pump(&mut socket, &mut outbound, &events).await {
            LinkEnd::Closed => {
                let _ = socket.send(Message::Text(codec::DISCONNECT.to_string())).await;
                let _ = socket.close(None).await;
                tracing::debug!("Link closed by client");
                return;
            }
            LinkEnd::Kicked => {
                tracing::info!("Server closed the session");
                let _ = events.send(TransportEvent::Disconnected).await;
                return;
            }
            LinkEnd::Dropped(reason) => {
                tracing::warn!(reason = %reason, "Socket dropped");
                if events.send(TransportEvent::Disconnected).await.is_err() {
                    return;
                }
            }
        }

        match reconnect(&url, &options, &events).await {
            Some(fresh) => {
                socket = fresh;
                // Events queued during the outage are not replayed.
                while outbound.try_recv().is_ok() {}
                if events.send(TransportEvent::Connected).await.is_err() {
                    return;
                }
            }
            None => {
                let _ = events
                    .send(TransportEvent::Failed(format!(
                        "gave up after {} reconnect attempts",
                        options.reconnect_attempts
                    )))
                    .await;
                return;
            }
        }
    }
}

/// Forward traffic until the socket ends.
async fn pump(
    socket: &mut WsStream,
    outbound: &mut mpsc::UnboundedReceiver<ClientEvent>,
    events: &mpsc::Sender<TransportEvent>,
) -> LinkEnd {
    loop {
        tokio::select! {
            event = outbound.recv() => {
                let Some(event) = event else {
                    return LinkEnd::Closed;
                };
                tracing::trace!(event = event.name(), "Sending event");
                if let Err(e) = socket.send(Message::Text(codec::encode_client_event(&event))).await {
                    return LinkEnd::Dropped(e.to_string());
                }
            }
            frame = socket.next() => {
                let text = match frame {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Close(_))) | None => return LinkEnd::Dropped("socket closed".to_string()),
                    // Ignore control frames and binary messages
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
                };

                match codec::decode(&text) {
                    Ok(Packet::Ping) => {
                        if let Err(e) = socket.send(Message::Text(codec::PONG.to_string())).await {
                            return LinkEnd::Dropped(e.to_string());
                        }
                    }
                    Ok(Packet::Event { name, payload }) => match ServerEvent::decode(&name, payload) {
                        Ok(event) => {
                            if events.send(TransportEvent::Event(event)).await.is_err() {
                                return LinkEnd::Closed;
                            }
                        }
                        Err(e) => tracing::warn!(event = %name, error = %e, "Dropping undecodable event"),
                    },
                    Ok(Packet::Disconnect) => return LinkEnd::Kicked,
                    Ok(Packet::Close) => return LinkEnd::Dropped("server closed the socket".to_string()),
                    Ok(other) => tracing::trace!(packet = ?other, "Ignoring packet"),
                    Err(e) => tracing::debug!(error = %e, text = %text, "Failed to decode frame"),
                }
            }
        }
    }
}

/// Retry the handshake with a fixed delay. `None` when every attempt failed
/// or the client went away.
async fn reconnect(
    url: &str,
    options: &ConnectOptions,
    events: &mpsc::Sender<TransportEvent>,
) -> Option<WsStream> {
    for attempt in 1..=options.reconnect_attempts {
        tokio::time::sleep(options.reconnect_delay).await;
        if events.is_closed() {
            return None;
        }

        match open_socket(url).await {
            Ok(socket) => {
                tracing::info!(attempt, "Reconnected");
                return Some(socket);
            }
            Err(e) => tracing::debug!(attempt, error = %e, "Reconnect attempt failed"),
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_endpoint_maps_to_ws() {
        assert_eq!(
            socket_url("http://localhost:3000").unwrap(),
            "ws://localhost:3000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn https_endpoint_maps_to_wss() {
        assert_eq!(
            socket_url("https://chat.example.com/").unwrap(),
            "wss://chat.example.com/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn explicit_socket_path_is_kept() {
        assert_eq!(
            socket_url("ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket").unwrap(),
            "ws://127.0.0.1:9000/socket.io/?EIO=4&transport=websocket"
        );
    }

    #[test]
    fn unsupported_endpoints_are_rejected() {
        assert!(matches!(socket_url("ftp://host"), Err(TransportError::InvalidEndpoint(_))));
        assert!(matches!(socket_url("localhost:3000"), Err(TransportError::InvalidEndpoint(_))));
        assert!(matches!(socket_url("http://"), Err(TransportError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn unreachable_server_fails_to_connect() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector::new()
            .connect(&format!("http://{addr}"), &ConnectOptions::default())
            .await;
        assert!(matches!(result, Err(TransportError::Connection(_))));
    }
}
