//! Assistant requests.
//!
//! At most one assistant request is in flight per client. A request resolves
//! when the server reports the assistant idle, when the assistant's answer
//! arrives, or when the link drops.

use smartchat_core::{ClientEvent, EventKind, ServerEvent};

use crate::command::{self, Command};
use crate::connection::EventSink;
use crate::error::{ChatError, Result};
use crate::session::Identity;

/// Local assistant request status.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum AiStatus {
    /// No request in flight.
    #[default]
    Idle,
    /// Waiting for an answer.
    Pending {
        /// Prompt that was sent.
        prompt: String,
    },
}

/// What a submission turned into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    /// Blank input. Nothing was sent.
    Ignored,
    /// Sent as a chat message.
    Chat,
    /// Sent as a chat message plus an assistant request.
    AskAi {
        /// Prompt sent to the assistant.
        prompt: String,
    },
}

/// A submission and the events to send for it, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outgoing {
    /// What the input was classified as.
    pub submission: Submission,
    /// Events to send.
    pub events: Vec<ClientEvent>,
}

/// Tracks the local assistant request and the room-wide busy flag.
#[derive(Debug, Clone)]
pub struct AiRequestCoordinator {
    identity: Identity,
    status: AiStatus,
    remote_busy: bool,
}

impl AiRequestCoordinator {
    /// Create an idle coordinator for the local `identity`.
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self {
            identity,
            status: AiStatus::Idle,
            remote_busy: false,
        }
    }

    /// Local request status.
    #[must_use]
    pub const fn status(&self) -> &AiStatus {
        &self.status
    }

    /// Whether a local request is in flight.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        matches!(self.status, AiStatus::Pending { .. })
    }

    /// Whether the assistant is answering anyone in the room.
    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.is_pending() || self.remote_busy
    }

    /// Whether the input may be submitted.
    #[must_use]
    pub const fn can_submit(&self) -> bool {
        !self.is_pending()
    }

    /// Turn raw input into outbound events.
    ///
    /// Every non-blank input is posted as a chat message under the local
    /// username. Input starting with `/ai` followed by a prompt also sends an
    /// assistant request and marks it pending.
    ///
    /// # Errors
    ///
    /// Returns `ChatError::RequestPending` while a request is in flight.
    pub fn submit(&mut self, raw: &str) -> Result<Outgoing> {
        if self.is_pending() {
            return Err(ChatError::RequestPending);
        }
        if raw.trim().is_empty() {
            return Ok(Outgoing {
                submission: Submission::Ignored,
                events: Vec::new(),
            });
        }

        let Identity { username, room } = &self.identity;
        let chat = ClientEvent::chat(username, room, raw);

        match command::parse(raw) {
            Command::Ask { prompt } if !prompt.is_empty() => {
                tracing::info!(room = %room, "Asking the assistant");
                self.status = AiStatus::Pending {
                    prompt: prompt.to_string(),
                };
                Ok(Outgoing {
                    submission: Submission::AskAi {
                        prompt: prompt.to_string(),
                    },
                    events: vec![chat, ClientEvent::ask_ai(username, room, prompt)],
                })
            }
            Command::Ask { .. } | Command::Chat => Ok(Outgoing {
                submission: Submission::Chat,
                events: vec![chat],
            }),
        }
    }

    fn resolve(&mut self, reason: &'static str) {
        if self.is_pending() {
            tracing::debug!(reason, "Assistant request resolved");
        }
        self.status = AiStatus::Idle;
        self.remote_busy = false;
    }
}

impl EventSink for AiRequestCoordinator {
    const KINDS: &'static [EventKind] = &[EventKind::AiLoading, EventKind::ChatMessage, EventKind::Disconnect];

    fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::AiLoading(true) => self.remote_busy = true,
            ServerEvent::AiLoading(false) => self.resolve("idle"),
            ServerEvent::ChatMessage(message) if message.is_from_ai() => self.resolve("answered"),
            ServerEvent::Disconnect => self.resolve("disconnected"),
            _ => {}
        }
    }
}
