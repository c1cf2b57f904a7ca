//! Socket.IO v4 text framing over Engine.IO v4.
//!
//! Only the subset a chat client needs is supported: the open handshake,
//! heartbeats, namespace connect/disconnect and text events. Binary
//! attachments and acknowledgments are not.
//!
//! Frame layout: one Engine.IO type digit, then for Engine.IO messages (`4`)
//! one Socket.IO type digit, an optional `/namespace,`, an optional ack id and
//! the JSON data.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use smartchat_core::ClientEvent;

/// Engine.IO pong, sent in reply to a server ping.
pub const PONG: &str = "3";

/// Engine.IO ping.
pub const PING: &str = "2";

/// Socket.IO connect request for the default namespace.
pub const CONNECT: &str = "40";

/// Socket.IO disconnect for the default namespace.
pub const DISCONNECT: &str = "41";

/// Errors decoding a frame.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame was empty.
    #[error("empty frame")]
    Empty,

    /// The packet type is not recognized.
    #[error("unknown packet type: {0}")]
    UnknownType(String),

    /// The JSON data did not parse.
    #[error("invalid packet data: {0}")]
    Json(#[from] serde_json::Error),

    /// An event packet did not carry `[name, ...args]`.
    #[error("malformed event packet")]
    MalformedEvent,
}

/// Engine.IO open handshake data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Handshake {
    /// Engine.IO session ID.
    pub sid: String,
    /// Server ping interval, in milliseconds.
    #[serde(default)]
    pub ping_interval: u64,
    /// Server ping timeout, in milliseconds.
    #[serde(default)]
    pub ping_timeout: u64,
}

/// A decoded frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// Engine.IO open.
    Open(Handshake),
    /// Engine.IO close.
    Close,
    /// Engine.IO ping.
    Ping,
    /// Engine.IO pong.
    Pong,
    /// Engine.IO upgrade or noop.
    Noop,
    /// Socket.IO namespace connected.
    Connect(Value),
    /// Socket.IO namespace disconnected.
    Disconnect,
    /// Socket.IO event.
    Event {
        /// Event name.
        name: String,
        /// First argument, or `null` without one.
        payload: Value,
    },
    /// Socket.IO acknowledgment. Not used by this client.
    Ack,
    /// Socket.IO namespace connect refused.
    ConnectError(String),
}

/// Decode one text frame.
///
/// # Errors
///
/// Returns an error if the frame is not a supported packet.
pub fn decode(frame: &str) -> Result<Packet, CodecError> {
    let (engine, rest) = split_type(frame)?;
    match engine {
        '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
        '1' => Ok(Packet::Close),
        '2' => Ok(Packet::Ping),
        '3' => Ok(Packet::Pong),
        '4' => decode_socket(rest),
        '5' | '6' => Ok(Packet::Noop),
        other => Err(CodecError::UnknownType(other.to_string())),
    }
}

fn decode_socket(frame: &str) -> Result<Packet, CodecError> {
    let (kind, rest) = split_type(frame)?;
    let data = strip_ack_id(strip_namespace(rest));

    match kind {
        '0' => Ok(Packet::Connect(parse_data(data)?)),
        '1' => Ok(Packet::Disconnect),
        '2' => {
            let Value::Array(args) = parse_data(data)? else {
                return Err(CodecError::MalformedEvent);
            };
            let mut args = args.into_iter();
            let Some(Value::String(name)) = args.next() else {
                return Err(CodecError::MalformedEvent);
            };
            Ok(Packet::Event {
                name,
                payload: args.next().unwrap_or(Value::Null),
            })
        }
        '3' => Ok(Packet::Ack),
        '4' => {
            let message = match parse_data(data)? {
                Value::Object(fields) => match fields.get("message") {
                    Some(Value::String(message)) => message.clone(),
                    _ => Value::Object(fields).to_string(),
                },
                Value::String(message) => message,
                other => other.to_string(),
            };
            Ok(Packet::ConnectError(message))
        }
        other => Err(CodecError::UnknownType(format!("4{other}"))),
    }
}

fn split_type(frame: &str) -> Result<(char, &str), CodecError> {
    let mut chars = frame.chars();
    let kind = chars.next().ok_or(CodecError::Empty)?;
    Ok((kind, chars.as_str()))
}

fn strip_namespace(data: &str) -> &str {
    if data.starts_with('/') {
        data.split_once(',').map_or("", |(_, rest)| rest)
    } else {
        data
    }
}

fn strip_ack_id(data: &str) -> &str {
    data.trim_start_matches(|c: char| c.is_ascii_digit())
}

fn parse_data(data: &str) -> Result<Value, CodecError> {
    if data.is_empty() {
        Ok(Value::Null)
    } else {
        Ok(serde_json::from_str(data)?)
    }
}

/// Encode an event frame.
#[must_use]
pub fn encode_event(name: &str, payload: &Value) -> String {
    format!("42{}", json!([name, payload]))
}

/// Encode a client event as an event frame.
#[must_use]
pub fn encode_client_event(event: &ClientEvent) -> String {
    encode_event(event.name(), &event.payload())
}

/// Encode an Engine.IO open frame. Used by in-process test servers.
///
/// # Errors
///
/// Returns an error if the handshake cannot be serialized.
pub fn encode_open(handshake: &Handshake) -> Result<String, CodecError> {
    Ok(format!("0{}", serde_json::to_string(handshake)?))
}

/// Encode a namespace connect acknowledgment carrying `sid`.
#[must_use]
pub fn encode_connect_ack(sid: &str) -> String {
    format!("40{}", json!({ "sid": sid }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartchat_core::{RoomName, Username};

    #[test]
    fn decodes_open_handshake() {
        let packet = decode(r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":20000}"#).unwrap();
        assert_eq!(
            packet,
            Packet::Open(Handshake {
                sid: "abc".into(),
                ping_interval: 25000,
                ping_timeout: 20000,
            })
        );
    }

    #[test]
    fn decodes_heartbeats() {
        assert_eq!(decode(PING).unwrap(), Packet::Ping);
        assert_eq!(decode(PONG).unwrap(), Packet::Pong);
    }

    #[test]
    fn decodes_namespace_connect() {
        assert_eq!(
            decode(r#"40{"sid":"xyz"}"#).unwrap(),
            Packet::Connect(json!({ "sid": "xyz" }))
        );
        assert_eq!(decode(CONNECT).unwrap(), Packet::Connect(Value::Null));
        assert_eq!(decode(DISCONNECT).unwrap(), Packet::Disconnect);
    }

    #[test]
    fn decodes_event_with_payload() {
        let packet = decode(r#"42["user-joined",{"username":"bob"}]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "user-joined".into(),
                payload: json!({ "username": "bob" }),
            }
        );
    }

    #[test]
    fn decodes_event_without_payload() {
        let packet = decode(r#"42["joined"]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "joined".into(),
                payload: Value::Null,
            }
        );
    }

    #[test]
    fn skips_namespace_and_ack_id() {
        let packet = decode(r#"42/chat,17["/ai/loading",true]"#).unwrap();
        assert_eq!(
            packet,
            Packet::Event {
                name: "/ai/loading".into(),
                payload: Value::Bool(true),
            }
        );
    }

    #[test]
    fn decodes_connect_error_message() {
        assert_eq!(
            decode(r#"44{"message":"Not authorized"}"#).unwrap(),
            Packet::ConnectError("Not authorized".into())
        );
    }

    #[test]
    fn rejects_malformed_frames() {
        assert!(matches!(decode(""), Err(CodecError::Empty)));
        assert!(matches!(decode("9"), Err(CodecError::UnknownType(_))));
        assert!(matches!(decode(r#"42{"a":1}"#), Err(CodecError::MalformedEvent)));
        assert!(matches!(decode("42[1,2]"), Err(CodecError::MalformedEvent)));
        assert!(matches!(decode("42[oops"), Err(CodecError::Json(_))));
    }

    #[test]
    fn encodes_client_event() {
        let user = Username::parse("alice").unwrap();
        let room = RoomName::parse("lobby").unwrap();
        let frame = encode_client_event(&ClientEvent::join(&user, &room));

        assert!(frame.starts_with("42"));
        let Packet::Event { name, payload } = decode(&frame).unwrap() else {
            panic!("expected an event frame");
        };
        assert_eq!(name, "join");
        assert_eq!(payload, json!({ "username": "alice", "room": "lobby" }));
    }

    #[test]
    fn server_frames_decode() {
        let handshake = Handshake {
            sid: "s1".into(),
            ping_interval: 25000,
            ping_timeout: 20000,
        };
        assert_eq!(decode(&encode_open(&handshake).unwrap()).unwrap(), Packet::Open(handshake));
        assert_eq!(
            decode(&encode_connect_ack("s1")).unwrap(),
            Packet::Connect(json!({ "sid": "s1" }))
        );
    }
}
