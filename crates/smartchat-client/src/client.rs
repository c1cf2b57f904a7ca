//! Chat client facade.
//!
//! [`ChatClient`] owns the connection and the session and creates the
//! room-scoped components when a join starts. Room state lives exactly as long
//! as the join: a refused, timed-out or left join drops it together with its
//! subscriptions.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::Instant;

use smartchat_core::{Message, RoomName, ServerEvent};

use crate::ai::{AiRequestCoordinator, Submission};
use crate::config::ClientConfig;
use crate::connection::{attach, Channel, ConnectionManager, ConnectionState, Connector, Shared, Subscription};
use crate::error::{ChatError, Result};
use crate::messages::MessageLog;
use crate::presence::PresenceTracker;
use crate::session::{Identity, IdentityErrors, JoinState, SavedIdentity, SessionStore};
use crate::store::IdentityStore;
use crate::typing::TypingCoordinator;
use crate::ws::WsConnector;

/// Point-in-time view of the session for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Accepted username.
    pub username: Option<String>,
    /// Accepted room.
    pub room: Option<String>,
    /// Connection state.
    pub connection: ConnectionState,
    /// Join handshake progress.
    pub join: JoinState,
    /// Socket ID from the server greeting.
    pub socket_id: Option<String>,
}

impl Session {
    /// Whether the server has acknowledged the join.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        self.join == JoinState::Joined
    }
}

/// Components that exist only while a room is joined or joining.
struct RoomScope {
    room: RoomName,
    presence: Shared<PresenceTracker>,
    messages: Shared<MessageLog>,
    typing: Shared<TypingCoordinator>,
    ai: Shared<AiRequestCoordinator>,
    _subscriptions: Vec<Subscription>,
}

impl RoomScope {
    fn open(identity: &Identity, channel: &Channel) -> Self {
        let presence: Shared<PresenceTracker> = Shared::default();
        let messages = Arc::new(Mutex::new(MessageLog::for_room(identity.room.as_str())));
        let typing = Arc::new(Mutex::new(TypingCoordinator::new(identity.clone())));
        let ai = Arc::new(Mutex::new(AiRequestCoordinator::new(identity.clone())));

        let mut subscriptions = attach(&presence, channel);
        subscriptions.extend(attach(&messages, channel));
        subscriptions.extend(attach(&typing, channel));
        subscriptions.extend(attach(&ai, channel));

        tracing::debug!(room = %identity.room, subscriptions = subscriptions.len(), "Room state created");

        Self {
            room: identity.room.clone(),
            presence,
            messages,
            typing,
            ai,
            _subscriptions: subscriptions,
        }
    }
}

/// A chat client bound to one server.
pub struct ChatClient {
    config: ClientConfig,
    connection: ConnectionManager,
    session: SessionStore,
    session_subscriptions: Vec<Subscription>,
    room: Option<RoomScope>,
}

impl ChatClient {
    /// Create a disconnected client.
    #[must_use]
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        store: Box<dyn IdentityStore>,
    ) -> Self {
        Self {
            config,
            connection: ConnectionManager::new(connector),
            session: SessionStore::new(store),
            session_subscriptions: Vec::new(),
            room: None,
        }
    }

    /// Create a client using the WebSocket transport.
    #[must_use]
    pub fn websocket(config: ClientConfig, store: Box<dyn IdentityStore>) -> Self {
        Self::new(config, Arc::new(WsConnector::new()), store)
    }

    /// Client configuration.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connection state.
    #[must_use]
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Handle for extra subscriptions, e.g. a UI listening for errors.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.connection.channel()
    }

    /// Connect to the configured endpoint. A successful connect clears the
    /// last recorded error.
    ///
    /// Connecting again after the transport gave up resumes a joined session.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::ConnectFailed` if the transport cannot connect.
    pub async fn connect(&mut self) -> Result<()> {
        if self.connection.state() == ConnectionState::Connected {
            return Ok(());
        }

        let options = self.config.connect_options();
        if let Err(e) = self.connection.connect(&self.config.endpoint, &options).await {
            self.session.record_error(e.clone());
            return Err(e);
        }

        self.session.take_error();
        let channel = self.connection.channel();
        self.session_subscriptions = self.session.attach(&channel);
        self.session.rejoin(&channel);
        Ok(())
    }

    /// Identity saved by a previous session.
    ///
    /// # Errors
    ///
    /// Returns an error if the identity store cannot be read.
    pub fn saved_identity(&self) -> Result<SavedIdentity> {
        self.session.saved_identity()
    }

    /// Validate and accept a username and room.
    ///
    /// An empty map means the identity was accepted.
    pub fn set_identity(&mut self, username: &str, room: &str) -> IdentityErrors {
        self.session.set_identity(username, room)
    }

    /// Start joining the accepted room.
    ///
    /// Joining again while a join is pending or complete is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a validation error without an accepted identity, or
    /// `ChatError::ConnectionUnavailable` when not connected.
    pub fn join(&mut self) -> Result<()> {
        if self.session.join_state() != JoinState::NotJoined {
            return Ok(());
        }

        let channel = self.connection.channel();
        let scope = self
            .session
            .identity()
            .map(|identity| RoomScope::open(identity, &channel));

        self.session.join(&channel, self.config.join_timeout())?;
        self.room = scope;
        Ok(())
    }

    /// Deadline of the pending join, if any.
    #[must_use]
    pub fn join_deadline(&self) -> Option<Instant> {
        self.session.join_deadline()
    }

    /// Abandon the join if its deadline has passed. Returns `true` if it was
    /// abandoned.
    pub fn check_join_timeout(&mut self, now: Instant) -> bool {
        let expired = self.session.expire_join(now);
        if expired {
            self.discard_abandoned_room();
        }
        expired
    }

    /// Submit the input box.
    ///
    /// Blank input is ignored. Every other input is posted as a chat message;
    /// `/ai <prompt>` also asks the assistant.
    ///
    /// # Errors
    ///
    /// Returns `NotJoined`, `ConnectionUnavailable` or `RequestPending` when
    /// the input cannot be sent. Nothing is sent in that case.
    pub fn submit(&mut self, raw: &str) -> Result<Submission> {
        if raw.trim().is_empty() {
            return Ok(Submission::Ignored);
        }

        let room = self
            .room
            .as_ref()
            .filter(|_| self.session.is_joined())
            .ok_or(ChatError::NotJoined)?;
        let channel = self.connection.channel();
        if !channel.is_connected() {
            return Err(ChatError::ConnectionUnavailable);
        }

        let outgoing = room.ai.lock().submit(raw)?;
        for event in outgoing.events {
            channel.send(event);
        }
        if let Some(stop) = room.typing.lock().input_changed("") {
            channel.send(stop);
        }

        Ok(outgoing.submission)
    }

    /// Report the current input box text so typing signals can be sent.
    pub fn input_changed(&mut self, text: &str) {
        let channel = self.connection.channel();
        let Some(room) = self.room.as_ref() else {
            return;
        };
        if !channel.is_connected() || !self.session.is_joined() {
            return;
        }

        if let Some(signal) = room.typing.lock().input_changed(text) {
            channel.send(signal);
        }
    }

    /// Whether the input box accepts a submission.
    #[must_use]
    pub fn can_submit(&self) -> bool {
        self.connection.state() == ConnectionState::Connected
            && self.session.is_joined()
            && self.room.as_ref().is_some_and(|room| room.ai.lock().can_submit())
    }

    /// Wait for the next inbound event and apply it to every component.
    ///
    /// Returns `None` once there is no link.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        let event = self.connection.recv().await?;
        self.after_event(&event);
        Some(event)
    }

    /// Apply the next already-buffered event, if any.
    pub fn try_next_event(&mut self) -> Option<ServerEvent> {
        let event = self.connection.try_recv()?;
        self.after_event(&event);
        Some(event)
    }

    /// Apply every already-buffered event. Returns how many were applied.
    pub fn drain_events(&mut self) -> usize {
        let mut applied = 0;
        while self.try_next_event().is_some() {
            applied += 1;
        }
        applied
    }

    fn after_event(&mut self, event: &ServerEvent) {
        if matches!(event, ServerEvent::Connect) {
            self.session.rejoin(&self.connection.channel());
        }
        self.discard_abandoned_room();
    }

    fn discard_abandoned_room(&mut self) {
        if self.room.is_some() && self.session.join_state() == JoinState::NotJoined {
            tracing::debug!("Discarding room state");
            self.room = None;
        }
    }

    /// Leave the room and disconnect.
    ///
    /// Sends the leave notice, drops all room state and the session, then
    /// closes the link.
    pub fn leave(&mut self) {
        let channel = self.connection.channel();
        self.session.leave(&channel);
        self.room = None;
        self.session_subscriptions.clear();
        self.session.reset();
        self.connection.disconnect();
        tracing::info!("Left room");
    }

    /// Snapshot of the session.
    #[must_use]
    pub fn session(&self) -> Session {
        let identity = self.session.identity();
        Session {
            username: identity.map(|identity| identity.username.to_string()),
            room: identity.map(|identity| identity.room.to_string()),
            connection: self.connection.state(),
            join: self.session.join_state(),
            socket_id: self.session.socket_id(),
        }
    }

    /// Take the most recent error.
    pub fn take_error(&mut self) -> Option<ChatError> {
        self.session.take_error()
    }

    // Accessors return snapshots so no room lock outlives the call.

    /// Online users, while a room is active.
    #[must_use]
    pub fn presence(&self) -> Option<PresenceTracker> {
        self.room.as_ref().map(|room| room.presence.lock().clone())
    }

    /// Message log, while a room is active.
    #[must_use]
    pub fn messages(&self) -> Option<MessageLog> {
        self.room.as_ref().map(|room| room.messages.lock().clone())
    }

    /// Typing state, while a room is active.
    #[must_use]
    pub fn typing(&self) -> Option<TypingCoordinator> {
        self.room.as_ref().map(|room| room.typing.lock().clone())
    }

    /// Assistant request state, while a room is active.
    #[must_use]
    pub fn ai(&self) -> Option<AiRequestCoordinator> {
        self.room.as_ref().map(|room| room.ai.lock().clone())
    }

    /// Messages for the active room, in order.
    #[must_use]
    pub fn room_messages(&self) -> Vec<Message> {
        self.room.as_ref().map_or_else(Vec::new, |room| {
            room.messages.lock().query(room.room.as_str()).cloned().collect()
        })
    }
}

impl fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.config.endpoint)
            .field("connection", &self.connection)
            .field("session", &self.session)
            .field("room", &self.room.as_ref().map(|room| room.room.as_str()))
            .finish_non_exhaustive()
    }
}
