//! Transport ownership and event fan-out.
//!
//! [`ConnectionManager`] is the only owner of the transport link. Every other
//! component receives a [`Channel`], which can publish outbound events and
//! subscribe to inbound ones but can never open or close the link.
//!
//! Subscriptions are scoped: [`Channel::subscribe`] returns a [`Subscription`]
//! guard and the handler is removed when the guard is dropped. Dropping a
//! room's guards is therefore enough to guarantee no handler can touch a
//! discarded room's state.
//!
//! Inbound events are dispatched synchronously, in transport order, from
//! [`ConnectionManager::recv`]. Handlers for the same kind run in the order
//! they were registered.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use smartchat_core::{ClientEvent, EventKind, ServerEvent};

use crate::config::ConnectOptions;
use crate::error::{ChatError, Result};

/// State shared between a component and its event handlers.
pub type Shared<T> = Arc<Mutex<T>>;

/// Connection lifecycle as seen by the user interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// No link.
    #[default]
    Disconnected,
    /// Opening the link, or re-establishing it after a drop.
    Connecting,
    /// Link is up; outbound events are forwarded.
    Connected,
    /// Opening the link failed, or the transport gave up reconnecting.
    Error,
}

impl ConnectionState {
    /// Human-readable display string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "Disconnected",
            Self::Connecting => "Connecting...",
            Self::Connected => "Connected",
            Self::Error => "Connection error",
        }
    }
}

// =============================================================================
// Transport
// =============================================================================

/// Events produced by a transport link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The link came back after a drop.
    Connected,
    /// The link dropped; the transport is trying to reconnect.
    Disconnected,
    /// An inbound protocol event.
    Event(ServerEvent),
    /// The transport gave up; the link is closed.
    Failed(String),
}

/// An open transport link.
///
/// Dropping `outbound` asks the transport to close; dropping `inbound` stops
/// delivery.
#[derive(Debug)]
pub struct TransportLink {
    /// Outbound events, forwarded in send order.
    pub outbound: mpsc::UnboundedSender<ClientEvent>,
    /// Inbound events, in the order the transport received them.
    pub inbound: mpsc::Receiver<TransportEvent>,
}

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint could not be turned into a transport URL.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Failed to connect.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The server did not complete the handshake.
    #[error("handshake failed: {0}")]
    Handshake(String),
}

/// Opens transport links.
///
/// This trait abstracts the wire transport, allowing for in-memory
/// implementations in tests.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a link to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns an error if the link cannot be established.
    async fn connect(
        &self,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> std::result::Result<TransportLink, TransportError>;
}

// =============================================================================
// Channel
// =============================================================================

type Handler = Box<dyn FnMut(&ServerEvent) + Send>;

struct Entry {
    id: u64,
    kind: EventKind,
    handler: Arc<Mutex<Handler>>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    entries: Vec<Entry>,
}

impl Registry {
    fn contains(&self, id: u64) -> bool {
        self.entries.iter().any(|entry| entry.id == id)
    }
}

#[derive(Default)]
struct ChannelInner {
    state: Mutex<ConnectionState>,
    outbound: Mutex<Option<mpsc::UnboundedSender<ClientEvent>>>,
    registry: Mutex<Registry>,
}

/// Publish/subscribe handle onto the connection.
#[derive(Clone, Default)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

impl Channel {
    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    /// Whether outbound events are currently forwarded.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Send an event. Fire-and-forget: dropped with a warning when the
    /// link is not connected.
    pub fn send(&self, event: ClientEvent) {
        if !self.is_connected() {
            tracing::warn!(event = event.name(), "Dropping outbound event while not connected");
            return;
        }

        let outbound = self.inner.outbound.lock();
        match outbound.as_ref() {
            Some(tx) => {
                let name = event.name();
                if tx.send(event).is_err() {
                    tracing::warn!(event = name, "Transport closed, outbound event dropped");
                } else {
                    tracing::trace!(event = name, "Outbound event queued");
                }
            }
            None => {
                tracing::warn!(event = event.name(), "No transport link, outbound event dropped");
            }
        }
    }

    /// Register `handler` for inbound events of `kind`.
    ///
    /// The handler stays registered until the returned guard is dropped or
    /// the connection is torn down.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> Subscription
    where
        F: FnMut(&ServerEvent) + Send + 'static,
    {
        let mut registry = self.inner.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.entries.push(Entry {
            id,
            kind,
            handler: Arc::new(Mutex::new(Box::new(handler))),
        });

        Subscription {
            id,
            kind,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().entries.len()
    }

    /// Deliver `event` to every handler registered for its kind.
    ///
    /// The registry lock is not held while handlers run, so handlers may
    /// subscribe or drop subscriptions. A handler removed during dispatch is
    /// not called.
    pub fn dispatch(&self, event: &ServerEvent) {
        let kind = event.kind();
        let handlers: Vec<(u64, Arc<Mutex<Handler>>)> = self
            .inner
            .registry
            .lock()
            .entries
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| (entry.id, Arc::clone(&entry.handler)))
            .collect();

        tracing::trace!(event = kind.name(), handlers = handlers.len(), "Dispatching inbound event");

        for (id, handler) in handlers {
            if !self.inner.registry.lock().contains(id) {
                continue;
            }
            let mut guard = handler.lock();
            let handler: &mut Handler = &mut guard;
            handler(event);
        }
    }

    fn set_state(&self, state: ConnectionState) -> ConnectionState {
        std::mem::replace(&mut *self.inner.state.lock(), state)
    }

    fn install(&self, outbound: Option<mpsc::UnboundedSender<ClientEvent>>) {
        *self.inner.outbound.lock() = outbound;
    }

    fn clear_subscribers(&self) {
        self.inner.registry.lock().entries.clear();
    }
}

/// Guard for a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler immediately"]
pub struct Subscription {
    id: u64,
    kind: EventKind,
    channel: Weak<ChannelInner>,
}

impl Subscription {
    /// Kind this subscription listens to.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            inner.registry.lock().entries.retain(|entry| entry.id != self.id);
        }
    }
}

/// A component whose state is driven by inbound events.
pub trait EventSink: Send + 'static {
    /// Kinds the component reacts to.
    const KINDS: &'static [EventKind];

    /// Apply one inbound event.
    fn apply(&mut self, event: &ServerEvent);
}

/// Subscribe `sink` to every kind it reacts to.
pub fn attach<T: EventSink>(sink: &Shared<T>, channel: &Channel) -> Vec<Subscription> {
    T::KINDS
        .iter()
        .map(|&kind| {
            let sink = Arc::clone(sink);
            channel.subscribe(kind, move |event| sink.lock().apply(event))
        })
        .collect()
}

// =============================================================================
// Connection Manager
// =============================================================================

/// Owns the transport link and pumps its events.
pub struct ConnectionManager {
    connector: Arc<dyn Connector>,
    channel: Channel,
    inbound: Option<mpsc::Receiver<TransportEvent>>,
}

impl ConnectionManager {
    /// Create a disconnected manager.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            channel: Channel::default(),
            inbound: None,
        }
    }

    /// Handle for publishing and subscribing.
    #[must_use]
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    /// Open the link.
    ///
    /// Connecting while already connected is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::ConnectFailed` if the transport cannot connect; the
    /// state is then `Error`.
    pub async fn connect(&mut self, endpoint: &str, options: &ConnectOptions) -> Result<()> {
        if self.state() == ConnectionState::Connected {
            return Ok(());
        }

        self.channel.set_state(ConnectionState::Connecting);
        tracing::info!(endpoint = %endpoint, "Connecting");

        match self.connector.connect(endpoint, options).await {
            Ok(link) => {
                self.channel.install(Some(link.outbound));
                self.inbound = Some(link.inbound);
                self.channel.set_state(ConnectionState::Connected);
                tracing::info!(endpoint = %endpoint, "Connected");
                Ok(())
            }
            Err(e) => {
                self.channel.set_state(ConnectionState::Error);
                tracing::warn!(endpoint = %endpoint, error = %e, "Connection failed");
                Err(ChatError::ConnectFailed(e.to_string()))
            }
        }
    }

    /// Tear down every subscription and close the link.
    pub fn disconnect(&mut self) {
        self.channel.clear_subscribers();
        self.channel.install(None);
        self.inbound = None;
        let previous = self.channel.set_state(ConnectionState::Disconnected);
        if previous != ConnectionState::Disconnected {
            tracing::info!("Disconnected");
        }
    }

    /// Wait for the next inbound event, dispatch it, and return it.
    ///
    /// Returns `None` once there is no link.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        loop {
            let next = self.inbound.as_mut()?.recv().await;
            if let Some(event) = self.handle(next) {
                return Some(event);
            }
        }
    }

    /// Dispatch and return the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        loop {
            let next = match self.inbound.as_mut()?.try_recv() {
                Ok(event) => Some(event),
                Err(mpsc::error::TryRecvError::Empty) => return None,
                Err(mpsc::error::TryRecvError::Disconnected) => None,
            };
            if let Some(event) = self.handle(next) {
                return Some(event);
            }
        }
    }

    /// Apply a transport event to the connection state and fan it out.
    fn handle(&mut self, next: Option<TransportEvent>) -> Option<ServerEvent> {
        let event = match next {
            Some(TransportEvent::Event(event)) => event,
            Some(TransportEvent::Connected) => {
                let previous = self.channel.set_state(ConnectionState::Connected);
                if previous == ConnectionState::Connected {
                    return None;
                }
                tracing::info!("Reconnected");
                ServerEvent::Connect
            }
            Some(TransportEvent::Disconnected) => {
                let previous = self.channel.set_state(ConnectionState::Connecting);
                if previous != ConnectionState::Connected {
                    return None;
                }
                tracing::warn!("Link dropped, waiting for reconnect");
                ServerEvent::Disconnect
            }
            Some(TransportEvent::Failed(reason)) => {
                self.channel.set_state(ConnectionState::Error);
                tracing::warn!(reason = %reason, "Transport gave up");
                return None;
            }
            None => {
                self.inbound = None;
                self.channel.install(None);
                let previous = self.channel.state();
                if previous == ConnectionState::Error {
                    return None;
                }
                self.channel.set_state(ConnectionState::Disconnected);
                if previous != ConnectionState::Connected {
                    return None;
                }
                tracing::info!("Link closed by transport");
                ServerEvent::Disconnect
            }
        };

        self.channel.dispatch(&event);
        Some(event)
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("channel", &self.channel)
            .field("linked", &self.inbound.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockConnector;
    use smartchat_core::{Message, RoomName, Username};

    fn manager() -> (ConnectionManager, crate::testing::MockServer) {
        let (connector, server) = MockConnector::pair();
        (ConnectionManager::new(Arc::new(connector)), server)
    }

    fn counter(channel: &Channel, kind: EventKind) -> (Shared<Vec<ServerEvent>>, Subscription) {
        let seen: Shared<Vec<ServerEvent>> = Shared::default();
        let sink = Arc::clone(&seen);
        let sub = channel.subscribe(kind, move |event| sink.lock().push(event.clone()));
        (seen, sub)
    }

    #[tokio::test]
    async fn connect_transitions_to_connected() {
        let (mut manager, _server) = manager();
        assert_eq!(manager.state(), ConnectionState::Disconnected);

        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn failed_connect_enters_error_state() {
        let (mut manager, server) = manager();
        server.fail_next_connect("refused");

        let result = manager.connect("mock://", &ConnectOptions::default()).await;
        assert!(matches!(result, Err(ChatError::ConnectFailed(reason)) if reason.contains("refused")));
        assert_eq!(manager.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn sends_are_forwarded_in_call_order() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();
        let channel = manager.channel();

        let user = Username::parse("alice").unwrap();
        let room = RoomName::parse("lobby").unwrap();
        channel.send(ClientEvent::typing(&user, &room));
        channel.send(ClientEvent::chat(&user, &room, "hi"));
        channel.send(ClientEvent::stop_typing(&user, &room));

        assert_eq!(server.sent_names(), ["typing", "chat message", "stop-typing"]);
    }

    #[tokio::test]
    async fn sends_while_disconnected_are_dropped() {
        let (manager, server) = manager();
        let user = Username::parse("alice").unwrap();
        let room = RoomName::parse("lobby").unwrap();

        manager.channel().send(ClientEvent::join(&user, &room));
        assert!(server.sent().is_empty());
    }

    #[tokio::test]
    async fn inbound_events_reach_subscribers_in_order() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();
        let (seen, _sub) = counter(&manager.channel(), EventKind::ChatMessage);

        server.push(ServerEvent::ChatMessage(Message::new("bob", "lobby", "one")));
        server.push(ServerEvent::AiLoading(true));
        server.push(ServerEvent::ChatMessage(Message::new("bob", "lobby", "two")));

        for _ in 0..3 {
            manager.recv().await.unwrap();
        }

        let bodies: Vec<String> = seen
            .lock()
            .iter()
            .map(|event| match event {
                ServerEvent::ChatMessage(m) => m.body.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(bodies, ["one", "two"]);
    }

    #[tokio::test]
    async fn dropping_subscription_unsubscribes() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();
        let channel = manager.channel();
        let (seen, sub) = counter(&channel, EventKind::Joined);
        assert_eq!(channel.subscriber_count(), 1);

        drop(sub);
        assert_eq!(channel.subscriber_count(), 0);

        server.push(ServerEvent::Joined);
        manager.recv().await.unwrap();
        assert!(seen.lock().is_empty());
    }

    #[tokio::test]
    async fn disconnect_clears_every_listener() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();
        let channel = manager.channel();
        let (_a, _sub_a) = counter(&channel, EventKind::Joined);
        let (_b, _sub_b) = counter(&channel, EventKind::Typing);

        manager.disconnect();
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert!(server.link_closed());
        assert!(manager.recv().await.is_none());
    }

    #[tokio::test]
    async fn drop_and_reconnect_emit_synthetic_events() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();

        server.drop_link();
        assert_eq!(manager.recv().await, Some(ServerEvent::Disconnect));
        assert_eq!(manager.state(), ConnectionState::Connecting);

        server.restore_link();
        assert_eq!(manager.recv().await, Some(ServerEvent::Connect));
        assert_eq!(manager.state(), ConnectionState::Connected);
    }

    #[tokio::test]
    async fn transport_failure_enters_error_state() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();

        server.drop_link();
        server.fail_link("gave up");
        assert_eq!(manager.recv().await, Some(ServerEvent::Disconnect));
        assert_eq!(manager.recv().await, None);
        assert_eq!(manager.state(), ConnectionState::Error);
    }

    #[tokio::test]
    async fn handler_may_unsubscribe_a_later_handler() {
        let (mut manager, server) = manager();
        manager.connect("mock://", &ConnectOptions::default()).await.unwrap();
        let channel = manager.channel();

        let victim: Shared<Option<Subscription>> = Shared::default();
        let victim_slot = Arc::clone(&victim);
        let _first = channel.subscribe(EventKind::Joined, move |_| {
            victim_slot.lock().take();
        });
        let (seen, second) = counter(&channel, EventKind::Joined);
        *victim.lock() = Some(second);

        server.push(ServerEvent::Joined);
        manager.recv().await.unwrap();
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn attach_subscribes_every_kind() {
        struct Sink(usize);
        impl EventSink for Sink {
            const KINDS: &'static [EventKind] = &[EventKind::Typing, EventKind::StopTyping];
            fn apply(&mut self, _event: &ServerEvent) {
                self.0 += 1;
            }
        }

        let channel = Channel::default();
        let sink = Arc::new(Mutex::new(Sink(0)));
        let subs = attach(&sink, &channel);
        assert_eq!(subs.len(), 2);
        assert_eq!(channel.subscriber_count(), 2);

        channel.dispatch(&ServerEvent::StopTyping(smartchat_core::UserPayload {
            username: "bob".into(),
        }));
        assert_eq!(sink.lock().0, 1);
    }
}
