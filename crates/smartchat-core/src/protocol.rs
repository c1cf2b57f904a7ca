//! The smartchat event protocol.
//!
//! Every event that crosses the wire is one variant of [`ClientEvent`]
//! (client -> server) or [`ServerEvent`] (server -> client). Payloads are
//! validated when an event is decoded, so the rest of the system only ever
//! sees well-formed events.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ProtocolError, Result};
use crate::names::{RoomName, Username, AI_USERNAME};

// =============================================================================
// Payloads
// =============================================================================

/// A chat message as broadcast by the server.
///
/// On the wire this is `{message, user, room}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Author of the message. `"AI"` marks the assistant.
    #[serde(rename = "user", alias = "username")]
    pub sender: String,
    /// Room the message was posted in.
    #[serde(default)]
    pub room: String,
    /// Message text.
    #[serde(rename = "message")]
    pub body: String,
}

impl Message {
    /// Create a message.
    #[must_use]
    pub fn new(sender: impl Into<String>, room: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            room: room.into(),
            body: body.into(),
        }
    }

    /// Whether the assistant authored this message.
    #[must_use]
    pub fn is_from_ai(&self) -> bool {
        self.sender == AI_USERNAME
    }

    /// Whether `username` authored this message. Display only.
    #[must_use]
    pub fn is_own(&self, username: &str) -> bool {
        self.sender == username
    }
}

/// `{username, room}`, used by join, leave and the typing signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberPayload {
    /// Acting user.
    pub username: String,
    /// Target room.
    pub room: String,
}

/// `{prompt, user, room}` for an assistant request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AskAiPayload {
    /// Question for the assistant, without the command prefix.
    pub prompt: String,
    /// User asking the question.
    pub user: String,
    /// Room the answer is posted to.
    pub room: String,
}

/// `{username}`, used by presence deltas and remote typing signals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPayload {
    /// User the event is about.
    pub username: String,
}

#[derive(Deserialize)]
struct WelcomePayload {
    #[serde(rename = "socketId")]
    socket_id: String,
}

#[derive(Deserialize)]
struct ErrorPayload {
    message: String,
}

/// Entries of an `online-users` snapshot: plain names, or member objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum OnlineUser {
    Name(String),
    Member { username: String },
}

impl From<OnlineUser> for String {
    fn from(user: OnlineUser) -> Self {
        match user {
            OnlineUser::Name(name) | OnlineUser::Member { username: name } => name,
        }
    }
}

// =============================================================================
// Client -> Server
// =============================================================================

/// Events sent by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Enter a room.
    Join(MemberPayload),
    /// Leave a room.
    Leave(MemberPayload),
    /// Post a message to the room.
    ChatMessage(Message),
    /// The user started composing.
    Typing(MemberPayload),
    /// The user cleared their input.
    StopTyping(MemberPayload),
    /// Ask the assistant a question.
    AskAi(AskAiPayload),
}

impl ClientEvent {
    /// Build a `join` event.
    #[must_use]
    pub fn join(username: &Username, room: &RoomName) -> Self {
        Self::Join(member(username, room))
    }

    /// Build a `leave` event.
    #[must_use]
    pub fn leave(username: &Username, room: &RoomName) -> Self {
        Self::Leave(member(username, room))
    }

    /// Build a `typing` event.
    #[must_use]
    pub fn typing(username: &Username, room: &RoomName) -> Self {
        Self::Typing(member(username, room))
    }

    /// Build a `stop-typing` event.
    #[must_use]
    pub fn stop_typing(username: &Username, room: &RoomName) -> Self {
        Self::StopTyping(member(username, room))
    }

    /// Build a `chat message` event carrying `body` verbatim.
    #[must_use]
    pub fn chat(username: &Username, room: &RoomName, body: impl Into<String>) -> Self {
        Self::ChatMessage(Message::new(username.as_str(), room.as_str(), body))
    }

    /// Build an `/ask/ai` event.
    #[must_use]
    pub fn ask_ai(username: &Username, room: &RoomName, prompt: impl Into<String>) -> Self {
        Self::AskAi(AskAiPayload {
            prompt: prompt.into(),
            user: username.to_string(),
            room: room.to_string(),
        })
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Join(_) => "join",
            Self::Leave(_) => "leave",
            Self::ChatMessage(_) => "chat message",
            Self::Typing(_) => "typing",
            Self::StopTyping(_) => "stop-typing",
            Self::AskAi(_) => "/ask/ai",
        }
    }

    /// JSON payload of the event.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Join(m) | Self::Leave(m) | Self::Typing(m) | Self::StopTyping(m) => {
                json!({ "username": m.username, "room": m.room })
            }
            Self::ChatMessage(m) => json!({ "message": m.body, "user": m.sender, "room": m.room }),
            Self::AskAi(a) => json!({ "prompt": a.prompt, "user": a.user, "room": a.room }),
        }
    }

    /// Decode a client event received by a server.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown or the payload is malformed.
    pub fn decode(name: &str, payload: Value) -> Result<Self> {
        match name {
            "join" => Ok(Self::Join(parse("join", payload)?)),
            "leave" => Ok(Self::Leave(parse("leave", payload)?)),
            "chat message" => Ok(Self::ChatMessage(parse("chat message", payload)?)),
            "typing" => Ok(Self::Typing(parse("typing", payload)?)),
            "stop-typing" => Ok(Self::StopTyping(parse("stop-typing", payload)?)),
            "/ask/ai" => Ok(Self::AskAi(parse("/ask/ai", payload)?)),
            other => Err(ProtocolError::UnknownEvent(other.to_string())),
        }
    }
}

fn member(username: &Username, room: &RoomName) -> MemberPayload {
    MemberPayload {
        username: username.to_string(),
        room: room.to_string(),
    }
}

// =============================================================================
// Server -> Client
// =============================================================================

/// Inbound event kinds, used as subscription keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Transport (re)connected.
    Connect,
    /// Transport dropped.
    Disconnect,
    /// Server greeting with the socket ID.
    Welcome,
    /// Join acknowledgment.
    Joined,
    /// A chat message broadcast.
    ChatMessage,
    /// Authoritative message history.
    MessagesFetched,
    /// Authoritative presence list.
    OnlineUsers,
    /// A user entered the room.
    UserJoined,
    /// A user left the room.
    UserLeft,
    /// A user started typing.
    Typing,
    /// A user stopped typing.
    StopTyping,
    /// Assistant busy flag.
    AiLoading,
    /// Server-side error.
    Error,
}

impl EventKind {
    /// Every inbound kind.
    pub const ALL: [Self; 13] = [
        Self::Connect,
        Self::Disconnect,
        Self::Welcome,
        Self::Joined,
        Self::ChatMessage,
        Self::MessagesFetched,
        Self::OnlineUsers,
        Self::UserJoined,
        Self::UserLeft,
        Self::Typing,
        Self::StopTyping,
        Self::AiLoading,
        Self::Error,
    ];

    /// Wire name of the event kind.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Welcome => "welcome",
            Self::Joined => "joined",
            Self::ChatMessage => "chat message",
            Self::MessagesFetched => "/chats/messages/fetch",
            Self::OnlineUsers => "online-users",
            Self::UserJoined => "user-joined",
            Self::UserLeft => "user-left",
            Self::Typing => "typing",
            Self::StopTyping => "stop-typing",
            Self::AiLoading => "/ai/loading",
            Self::Error => "error",
        }
    }

    /// Look up a kind by wire name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }
}

/// Events delivered to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Transport (re)connected. Synthesized by the transport.
    Connect,
    /// Transport dropped. Synthesized by the transport.
    Disconnect,
    /// Greeting carrying this connection's socket ID.
    Welcome {
        /// Server-assigned socket ID.
        socket_id: String,
    },
    /// Join acknowledgment.
    Joined,
    /// A chat message broadcast.
    ChatMessage(Message),
    /// Authoritative message history, in server order.
    MessagesFetched(Vec<Message>),
    /// Authoritative presence list.
    OnlineUsers(Vec<String>),
    /// A user entered the room.
    UserJoined(UserPayload),
    /// A user left the room.
    UserLeft(UserPayload),
    /// A user started typing.
    Typing(UserPayload),
    /// A user stopped typing.
    StopTyping(UserPayload),
    /// Assistant busy flag.
    AiLoading(bool),
    /// Error relayed from the server.
    Error {
        /// Human-readable error message.
        message: String,
    },
}

impl ServerEvent {
    /// Kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Disconnect => EventKind::Disconnect,
            Self::Welcome { .. } => EventKind::Welcome,
            Self::Joined => EventKind::Joined,
            Self::ChatMessage(_) => EventKind::ChatMessage,
            Self::MessagesFetched(_) => EventKind::MessagesFetched,
            Self::OnlineUsers(_) => EventKind::OnlineUsers,
            Self::UserJoined(_) => EventKind::UserJoined,
            Self::UserLeft(_) => EventKind::UserLeft,
            Self::Typing(_) => EventKind::Typing,
            Self::StopTyping(_) => EventKind::StopTyping,
            Self::AiLoading(_) => EventKind::AiLoading,
            Self::Error { .. } => EventKind::Error,
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind().name()
    }

    /// Decode an inbound event, validating its payload.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is unknown or the payload is malformed.
    pub fn decode(name: &str, payload: Value) -> Result<Self> {
        let kind = EventKind::from_name(name)
            .ok_or_else(|| ProtocolError::UnknownEvent(name.to_string()))?;
        let event_name = kind.name();

        let event = match kind {
            EventKind::Connect => Self::Connect,
            EventKind::Disconnect => Self::Disconnect,
            EventKind::Joined => Self::Joined,
            EventKind::Welcome => {
                let welcome: WelcomePayload = parse(event_name, payload)?;
                Self::Welcome {
                    socket_id: welcome.socket_id,
                }
            }
            EventKind::ChatMessage => Self::ChatMessage(parse(event_name, payload)?),
            EventKind::MessagesFetched => Self::MessagesFetched(parse(event_name, payload)?),
            EventKind::OnlineUsers => {
                let users: Vec<OnlineUser> = parse(event_name, payload)?;
                Self::OnlineUsers(users.into_iter().map(String::from).collect())
            }
            EventKind::UserJoined => Self::UserJoined(parse(event_name, payload)?),
            EventKind::UserLeft => Self::UserLeft(parse(event_name, payload)?),
            EventKind::Typing => Self::Typing(parse(event_name, payload)?),
            EventKind::StopTyping => Self::StopTyping(parse(event_name, payload)?),
            EventKind::AiLoading => Self::AiLoading(parse(event_name, payload)?),
            EventKind::Error => {
                let error: ErrorPayload = parse(event_name, payload)?;
                Self::Error {
                    message: error.message,
                }
            }
        };

        Ok(event)
    }

    /// JSON payload of the event, as a server would send it.
    #[must_use]
    pub fn payload(&self) -> Value {
        match self {
            Self::Connect | Self::Disconnect | Self::Joined => Value::Null,
            Self::Welcome { socket_id } => json!({ "socketId": socket_id }),
            Self::ChatMessage(m) => message_json(m),
            Self::MessagesFetched(messages) => {
                Value::Array(messages.iter().map(message_json).collect())
            }
            Self::OnlineUsers(users) => json!(users),
            Self::UserJoined(u) | Self::UserLeft(u) | Self::Typing(u) | Self::StopTyping(u) => {
                json!({ "username": u.username })
            }
            Self::AiLoading(loading) => Value::Bool(*loading),
            Self::Error { message } => json!({ "message": message }),
        }
    }
}

fn message_json(m: &Message) -> Value {
    json!({ "message": m.body, "user": m.sender, "room": m.room })
}

fn parse<T: DeserializeOwned>(event: &'static str, payload: Value) -> Result<T> {
    serde_json::from_value(payload).map_err(|source| ProtocolError::InvalidPayload { event, source })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> (Username, RoomName) {
        (
            Username::parse("alice").unwrap(),
            RoomName::parse("lobby").unwrap(),
        )
    }

    // =========================================================================
    // Outbound
    // =========================================================================

    #[test]
    fn outbound_names_match_wire_protocol() {
        let (user, room) = alice();
        assert_eq!(ClientEvent::join(&user, &room).name(), "join");
        assert_eq!(ClientEvent::leave(&user, &room).name(), "leave");
        assert_eq!(ClientEvent::chat(&user, &room, "hi").name(), "chat message");
        assert_eq!(ClientEvent::typing(&user, &room).name(), "typing");
        assert_eq!(ClientEvent::stop_typing(&user, &room).name(), "stop-typing");
        assert_eq!(ClientEvent::ask_ai(&user, &room, "q").name(), "/ask/ai");
    }

    #[test]
    fn chat_payload_uses_wire_field_names() {
        let (user, room) = alice();
        let payload = ClientEvent::chat(&user, &room, "/ai what is 2+2").payload();
        assert_eq!(payload["message"], "/ai what is 2+2");
        assert_eq!(payload["user"], "alice");
        assert_eq!(payload["room"], "lobby");
    }

    #[test]
    fn ask_ai_payload() {
        let (user, room) = alice();
        let payload = ClientEvent::ask_ai(&user, &room, "what is React?").payload();
        assert_eq!(
            payload,
            json!({ "prompt": "what is React?", "user": "alice", "room": "lobby" })
        );
    }

    #[test]
    fn client_event_decodes_on_server_side() {
        let (user, room) = alice();
        let event = ClientEvent::typing(&user, &room);
        let decoded = ClientEvent::decode(event.name(), event.payload()).unwrap();
        assert_eq!(decoded, event);
    }

    // =========================================================================
    // Inbound
    // =========================================================================

    #[test]
    fn decode_chat_message() {
        let event = ServerEvent::decode(
            "chat message",
            json!({ "message": "hi", "user": "bob", "room": "lobby", "id": "abc" }),
        )
        .unwrap();
        assert_eq!(event, ServerEvent::ChatMessage(Message::new("bob", "lobby", "hi")));
    }

    #[test]
    fn decode_chat_message_without_room() {
        let event = ServerEvent::decode("chat message", json!({ "message": "hi", "user": "AI" }))
            .unwrap();
        match event {
            ServerEvent::ChatMessage(m) => {
                assert!(m.is_from_ai());
                assert!(m.room.is_empty());
            }
            other => panic!("Expected ChatMessage, got {other:?}"),
        }
    }

    #[test]
    fn decode_history_preserves_order() {
        let event = ServerEvent::decode(
            "/chats/messages/fetch",
            json!([
                { "message": "first", "user": "a", "room": "lobby" },
                { "message": "second", "user": "b", "room": "lobby" },
            ]),
        )
        .unwrap();
        match event {
            ServerEvent::MessagesFetched(messages) => {
                let bodies: Vec<_> = messages.iter().map(|m| m.body.as_str()).collect();
                assert_eq!(bodies, ["first", "second"]);
            }
            other => panic!("Expected MessagesFetched, got {other:?}"),
        }
    }

    #[test]
    fn decode_online_users_accepts_names_and_members() {
        let event =
            ServerEvent::decode("online-users", json!(["alice", { "username": "bob" }])).unwrap();
        assert_eq!(
            event,
            ServerEvent::OnlineUsers(vec!["alice".to_string(), "bob".to_string()])
        );
    }

    #[test]
    fn decode_welcome_and_loading() {
        assert_eq!(
            ServerEvent::decode("welcome", json!({ "socketId": "s-1" })).unwrap(),
            ServerEvent::Welcome {
                socket_id: "s-1".to_string()
            }
        );
        assert_eq!(
            ServerEvent::decode("/ai/loading", json!(false)).unwrap(),
            ServerEvent::AiLoading(false)
        );
        assert_eq!(
            ServerEvent::decode("joined", Value::Null).unwrap(),
            ServerEvent::Joined
        );
    }

    #[test]
    fn decode_rejects_unknown_event() {
        let result = ServerEvent::decode("shutdown", Value::Null);
        assert!(matches!(result, Err(ProtocolError::UnknownEvent(name)) if name == "shutdown"));
    }

    #[test]
    fn decode_rejects_malformed_payload() {
        let result = ServerEvent::decode("/ai/loading", json!("yes"));
        assert!(matches!(
            result,
            Err(ProtocolError::InvalidPayload { event: "/ai/loading", .. })
        ));

        let result = ServerEvent::decode("user-joined", json!({ "name": "bob" }));
        assert!(matches!(result, Err(ProtocolError::InvalidPayload { .. })));
    }

    #[test]
    fn server_payload_decodes_back() {
        let event = ServerEvent::MessagesFetched(vec![Message::new("bob", "lobby", "hey")]);
        let decoded = ServerEvent::decode(event.name(), event.payload()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn every_kind_round_trips_its_name() {
        for kind in EventKind::ALL {
            assert_eq!(EventKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(EventKind::from_name("nope"), None);
    }
}
