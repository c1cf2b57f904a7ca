//! Session identity and the join handshake.
//!
//! A session moves `NotJoined -> Joining -> Joined`. It leaves `Joining` on
//! the server's acknowledgment, a server error, or the join timeout. The
//! identity is validated before any network activity and cannot change while
//! a room is joined.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use tokio::time::Instant;

use smartchat_core::{ClientEvent, EventKind, NameError, RoomName, ServerEvent, Username};

use crate::connection::{attach, Channel, EventSink, Shared, Subscription};
use crate::error::{ChatError, Result};
use crate::store::{IdentityStore, ROOM_KEY, USERNAME_KEY};

/// Join-form field an error is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Field {
    /// The username input.
    Username,
    /// The room input.
    Room,
    /// The form as a whole.
    Submit,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Username => "username",
            Self::Room => "room",
            Self::Submit => "submit",
        })
    }
}

/// Validation messages keyed by field. Empty means valid.
pub type IdentityErrors = BTreeMap<Field, String>;

/// A validated username and room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Local user.
    pub username: Username,
    /// Room to join.
    pub room: RoomName,
}

/// Raw identity values from the last session, for prefilling the join form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SavedIdentity {
    /// Last used username.
    pub username: Option<String>,
    /// Last used room.
    pub room: Option<String>,
}

/// Progress of the join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JoinState {
    /// No room joined.
    #[default]
    NotJoined,
    /// Join sent, waiting for the acknowledgment.
    Joining {
        /// When the attempt times out. `None` waits forever.
        deadline: Option<Instant>,
    },
    /// The server acknowledged the join.
    Joined,
}

/// Session state updated from inbound events.
#[derive(Debug, Default)]
pub struct SessionState {
    join: JoinState,
    socket_id: Option<String>,
    error: Option<ChatError>,
}

impl SessionState {
    /// Join handshake progress.
    #[must_use]
    pub const fn join_state(&self) -> JoinState {
        self.join
    }

    /// Socket ID from the server greeting.
    #[must_use]
    pub fn socket_id(&self) -> Option<&str> {
        self.socket_id.as_deref()
    }

    /// Most recent error, if not yet taken.
    #[must_use]
    pub const fn last_error(&self) -> Option<&ChatError> {
        self.error.as_ref()
    }
}

impl EventSink for SessionState {
    const KINDS: &'static [EventKind] = &[EventKind::Welcome, EventKind::Joined, EventKind::Error];

    fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Welcome { socket_id } => {
                tracing::debug!(socket_id = %socket_id, "Server greeting");
                self.socket_id = Some(socket_id.clone());
            }
            ServerEvent::Joined => match self.join {
                JoinState::Joining { .. } => {
                    tracing::info!("Join acknowledged");
                    self.join = JoinState::Joined;
                }
                JoinState::Joined => {}
                JoinState::NotJoined => tracing::debug!("Ignoring join acknowledgment, no join pending"),
            },
            ServerEvent::Error { message } => {
                tracing::warn!(error = %message, "Server error");
                if matches!(self.join, JoinState::Joining { .. }) {
                    self.join = JoinState::NotJoined;
                }
                self.error = Some(ChatError::Server(message.clone()));
            }
            _ => {}
        }
    }
}

/// Owns the identity and the join handshake.
pub struct SessionStore {
    store: Box<dyn IdentityStore>,
    identity: Option<Identity>,
    state: Shared<SessionState>,
}

impl SessionStore {
    /// Create a store with no identity.
    #[must_use]
    pub fn new(store: Box<dyn IdentityStore>) -> Self {
        Self {
            store,
            identity: None,
            state: Shared::default(),
        }
    }

    /// Current identity, if one has been accepted.
    #[must_use]
    pub const fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// Join handshake progress.
    #[must_use]
    pub fn join_state(&self) -> JoinState {
        self.state.lock().join
    }

    /// Whether the server has acknowledged the join.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.join_state() == JoinState::Joined
    }

    /// Socket ID from the server greeting.
    #[must_use]
    pub fn socket_id(&self) -> Option<String> {
        self.state.lock().socket_id.clone()
    }

    /// Deadline of the pending join, if any.
    #[must_use]
    pub fn join_deadline(&self) -> Option<Instant> {
        match self.join_state() {
            JoinState::Joining { deadline } => deadline,
            _ => None,
        }
    }

    /// Identity saved by a previous session.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store cannot be read.
    pub fn saved_identity(&self) -> Result<SavedIdentity> {
        Ok(SavedIdentity {
            username: self.store.get(USERNAME_KEY)?,
            room: self.store.get(ROOM_KEY)?,
        })
    }

    /// Validate and accept a username and room.
    ///
    /// Returns the validation messages; an empty map means the identity was
    /// accepted and saved. Nothing is sent to the server.
    pub fn set_identity(&mut self, username: &str, room: &str) -> IdentityErrors {
        let mut errors = IdentityErrors::new();

        if self.join_state() != JoinState::NotJoined {
            errors.insert(
                Field::Submit,
                "Leave the room before changing your username or room".to_string(),
            );
            return errors;
        }

        let username = match Username::parse(username) {
            Ok(username) => Some(username),
            Err(e) => {
                errors.insert(Field::Username, username_message(&e));
                None
            }
        };
        let room = match RoomName::parse(room) {
            Ok(room) => Some(room),
            Err(e) => {
                errors.insert(Field::Room, room_message(&e));
                None
            }
        };

        if let (Some(username), Some(room)) = (username, room) {
            if let Err(e) = self
                .store
                .set(USERNAME_KEY, username.as_str())
                .and_then(|()| self.store.set(ROOM_KEY, room.as_str()))
            {
                tracing::warn!(error = %e, "Failed to save identity");
            }
            self.identity = Some(Identity { username, room });
        }

        errors
    }

    /// Subscribe session state to the channel.
    pub fn attach(&self, channel: &Channel) -> Vec<Subscription> {
        attach(&self.state, channel)
    }

    /// Send the join request.
    ///
    /// Joining while a join is pending or complete is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a validation error without an identity, or
    /// `ChatError::ConnectionUnavailable` when the channel is not connected.
    pub fn join(&mut self, channel: &Channel, timeout: Option<Duration>) -> Result<()> {
        let identity = self.identity.as_ref().ok_or_else(|| ChatError::Validation {
            field: Field::Username,
            message: username_message(&NameError::Empty),
        })?;

        let mut state = self.state.lock();
        if state.join != JoinState::NotJoined {
            tracing::debug!(room = %identity.room, "Join already in progress");
            return Ok(());
        }
        if !channel.is_connected() {
            state.error = Some(ChatError::ConnectionUnavailable);
            return Err(ChatError::ConnectionUnavailable);
        }

        channel.send(ClientEvent::join(&identity.username, &identity.room));
        state.join = JoinState::Joining {
            deadline: timeout.map(|timeout| Instant::now() + timeout),
        };
        state.error = None;

        tracing::info!(username = %identity.username, room = %identity.room, "Joining room");
        Ok(())
    }

    /// Re-send the join after the link comes back.
    ///
    /// The server forgets room membership when the link drops.
    pub fn rejoin(&self, channel: &Channel) {
        let Some(identity) = self.identity.as_ref() else {
            return;
        };
        if self.join_state() == JoinState::NotJoined {
            return;
        }

        tracing::info!(room = %identity.room, "Rejoining after reconnect");
        channel.send(ClientEvent::join(&identity.username, &identity.room));
    }

    /// Abandon a join whose deadline has passed.
    ///
    /// Returns `true` if the join was abandoned.
    pub fn expire_join(&self, now: Instant) -> bool {
        let mut state = self.state.lock();
        match state.join {
            JoinState::Joining {
                deadline: Some(deadline),
            } if now >= deadline => {
                tracing::warn!("Join timed out");
                state.join = JoinState::NotJoined;
                state.error = Some(ChatError::Timeout);
                true
            }
            _ => false,
        }
    }

    /// Send the leave notice, if joined.
    pub fn leave(&self, channel: &Channel) {
        if let Some(identity) = self.identity.as_ref() {
            if self.join_state() != JoinState::NotJoined && channel.is_connected() {
                channel.send(ClientEvent::leave(&identity.username, &identity.room));
            }
        }
    }

    /// Forget the identity and all join progress.
    pub fn reset(&mut self) {
        self.identity = None;
        *self.state.lock() = SessionState::default();
    }

    /// Record an error for the user interface.
    pub fn record_error(&self, error: ChatError) {
        self.state.lock().error = Some(error);
    }

    /// Take the most recent error.
    pub fn take_error(&self) -> Option<ChatError> {
        self.state.lock().error.take()
    }
}

impl fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionStore")
            .field("identity", &self.identity)
            .field("state", &*self.state.lock())
            .finish_non_exhaustive()
    }
}

fn username_message(err: &NameError) -> String {
    match err {
        NameError::Empty => "Username is required".to_string(),
        NameError::TooShort { min } => format!("Username must be at least {min} characters"),
        NameError::TooLong { max } => format!("Username must be at most {max} characters"),
    }
}

fn room_message(err: &NameError) -> String {
    match err {
        NameError::Empty => "Room name is required".to_string(),
        NameError::TooShort { min } => format!("Room name must be at least {min} characters"),
        NameError::TooLong { max } => format!("Room name must be at most {max} characters"),
    }
}
