//! In-memory transport for tests.
//!
//! [`MockConnector`] hands out links whose far end is a [`MockServer`]. The
//! server records everything the client sends and lets a test inject inbound
//! events, drop and restore the link, or refuse the next connection.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use smartchat_core::{ClientEvent, ServerEvent};

use crate::config::ConnectOptions;
use crate::connection::{Connector, TransportError, TransportEvent, TransportLink};

#[derive(Default)]
struct MockState {
    sent: Vec<ClientEvent>,
    outbound: Option<mpsc::UnboundedReceiver<ClientEvent>>,
    inbound: Option<mpsc::Sender<TransportEvent>>,
    refuse_next: Option<String>,
    connects: usize,
    endpoints: Vec<String>,
}

impl MockState {
    fn drain(&mut self) {
        if let Some(outbound) = self.outbound.as_mut() {
            while let Ok(event) = outbound.try_recv() {
                self.sent.push(event);
            }
        }
    }

    fn deliver(&self, event: TransportEvent) {
        match self.inbound.as_ref() {
            Some(inbound) => {
                if inbound.try_send(event).is_err() {
                    tracing::warn!("Mock link closed or full, inbound event dropped");
                }
            }
            None => tracing::warn!("No mock link, inbound event dropped"),
        }
    }
}

/// Connector producing in-memory links.
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<Mutex<MockState>>,
}

impl MockConnector {
    /// Create a connector and the server controlling its links.
    #[must_use]
    pub fn pair() -> (Self, MockServer) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockServer { state },
        )
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        endpoint: &str,
        options: &ConnectOptions,
    ) -> Result<TransportLink, TransportError> {
        let mut state = self.state.lock();
        state.endpoints.push(endpoint.to_string());

        if let Some(reason) = state.refuse_next.take() {
            return Err(TransportError::Connection(reason));
        }

        state.drain();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (inbound_tx, inbound_rx) = mpsc::channel(options.inbound_buffer.max(1));
        state.outbound = Some(outbound_rx);
        state.inbound = Some(inbound_tx);
        state.connects += 1;

        Ok(TransportLink {
            outbound: outbound_tx,
            inbound: inbound_rx,
        })
    }
}

/// Test-side controls for links made by a [`MockConnector`].
#[derive(Clone)]
pub struct MockServer {
    state: Arc<Mutex<MockState>>,
}

impl MockServer {
    /// Every event the client has sent, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<ClientEvent> {
        let mut state = self.state.lock();
        state.drain();
        state.sent.clone()
    }

    /// Wire names of every event the client has sent, in order.
    #[must_use]
    pub fn sent_names(&self) -> Vec<&'static str> {
        self.sent().iter().map(ClientEvent::name).collect()
    }

    /// Take and clear the sent log.
    pub fn take_sent(&self) -> Vec<ClientEvent> {
        let mut state = self.state.lock();
        state.drain();
        std::mem::take(&mut state.sent)
    }

    /// Deliver an inbound event.
    pub fn push(&self, event: ServerEvent) {
        self.state.lock().deliver(TransportEvent::Event(event));
    }

    /// Simulate the link dropping.
    pub fn drop_link(&self) {
        self.state.lock().deliver(TransportEvent::Disconnected);
    }

    /// Simulate the link coming back after a drop.
    pub fn restore_link(&self) {
        self.state.lock().deliver(TransportEvent::Connected);
    }

    /// Simulate the transport giving up, then close the link.
    pub fn fail_link(&self, reason: &str) {
        let mut state = self.state.lock();
        state.deliver(TransportEvent::Failed(reason.to_string()));
        state.inbound = None;
    }

    /// Refuse the next connection attempt with `reason`.
    pub fn fail_next_connect(&self, reason: &str) {
        self.state.lock().refuse_next = Some(reason.to_string());
    }

    /// Number of links handed out.
    #[must_use]
    pub fn connects(&self) -> usize {
        self.state.lock().connects
    }

    /// Endpoints passed to every connection attempt.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.state.lock().endpoints.clone()
    }

    /// Whether the client has let go of the current link.
    #[must_use]
    pub fn link_closed(&self) -> bool {
        self.state
            .lock()
            .inbound
            .as_ref()
            .map_or(true, mpsc::Sender::is_closed)
    }
}

impl std::fmt::Debug for MockServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MockServer")
            .field("sent", &state.sent.len())
            .field("connects", &state.connects)
            .finish_non_exhaustive()
    }
}
