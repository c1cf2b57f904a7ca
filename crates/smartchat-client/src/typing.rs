//! Typing indicators.
//!
//! Local input produces at most one `typing` per composing burst and one
//! `stop-typing` when the input empties. Remote indicators track the most
//! recent typer other than the local user.

use smartchat_core::{ClientEvent, EventKind, ServerEvent};

use crate::connection::EventSink;
use crate::session::Identity;

/// Local typing signals and the remote typing indicator.
#[derive(Debug, Clone)]
pub struct TypingCoordinator {
    identity: Identity,
    composing: bool,
    active_typer: Option<String>,
}

impl TypingCoordinator {
    /// Create a coordinator for the local `identity`.
    #[must_use]
    pub const fn new(identity: Identity) -> Self {
        Self {
            identity,
            composing: false,
            active_typer: None,
        }
    }

    /// Record a change of the local input, returning the signal to send.
    pub fn input_changed(&mut self, text: &str) -> Option<ClientEvent> {
        let composing = !text.is_empty();
        if composing == self.composing {
            return None;
        }
        self.composing = composing;

        let Identity { username, room } = &self.identity;
        Some(if composing {
            ClientEvent::typing(username, room)
        } else {
            ClientEvent::stop_typing(username, room)
        })
    }

    /// Whether a `typing` signal is outstanding.
    #[must_use]
    pub const fn is_composing(&self) -> bool {
        self.composing
    }

    /// The remote user currently shown as typing.
    #[must_use]
    pub fn active_typer(&self) -> Option<&str> {
        self.active_typer.as_deref()
    }

    /// Someone started typing. The local user's own echo is ignored.
    pub fn remote_typing(&mut self, username: &str) {
        if username != self.identity.username.as_str() {
            self.active_typer = Some(username.to_string());
        }
    }

    /// Someone stopped typing. Clears the indicator only if it was them.
    pub fn remote_stop(&mut self, username: &str) {
        if self.active_typer.as_deref() == Some(username) {
            self.active_typer = None;
        }
    }
}

impl EventSink for TypingCoordinator {
    const KINDS: &'static [EventKind] = &[EventKind::Typing, EventKind::StopTyping, EventKind::Disconnect];

    fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Typing(user) => self.remote_typing(&user.username),
            ServerEvent::StopTyping(user) => self.remote_stop(&user.username),
            ServerEvent::Disconnect => {
                self.active_typer = None;
                self.composing = false;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smartchat_core::{RoomName, UserPayload, Username};

    fn coordinator() -> TypingCoordinator {
        TypingCoordinator::new(Identity {
            username: Username::parse("alice").unwrap(),
            room: RoomName::parse("lobby").unwrap(),
        })
    }

    fn user(name: &str) -> UserPayload {
        UserPayload {
            username: name.to_string(),
        }
    }

    #[test]
    fn signals_on_transitions_only() {
        let mut typing = coordinator();

        let names: Vec<&str> = ["h", "he", "hel", "", "", "x"]
            .into_iter()
            .filter_map(|text| typing.input_changed(text))
            .map(|event| event.name())
            .collect();

        assert_eq!(names, ["typing", "stop-typing", "typing"]);
    }

    #[test]
    fn empty_input_at_rest_sends_nothing() {
        let mut typing = coordinator();
        assert_eq!(typing.input_changed(""), None);
    }

    #[test]
    fn remote_typer_is_shown() {
        let mut typing = coordinator();
        typing.apply(&ServerEvent::Typing(user("bob")));
        assert_eq!(typing.active_typer(), Some("bob"));
    }

    #[test]
    fn own_echo_is_ignored() {
        let mut typing = coordinator();
        typing.apply(&ServerEvent::Typing(user("alice")));
        assert_eq!(typing.active_typer(), None);
    }

    #[test]
    fn stop_from_someone_else_keeps_indicator() {
        let mut typing = coordinator();
        typing.apply(&ServerEvent::Typing(user("bob")));
        typing.apply(&ServerEvent::Typing(user("carol")));
        typing.apply(&ServerEvent::StopTyping(user("bob")));
        assert_eq!(typing.active_typer(), Some("carol"));

        typing.apply(&ServerEvent::StopTyping(user("carol")));
        assert_eq!(typing.active_typer(), None);
    }

    #[test]
    fn disconnect_clears_indicator() {
        let mut typing = coordinator();
        typing.input_changed("hi");
        typing.apply(&ServerEvent::Typing(user("bob")));
        typing.apply(&ServerEvent::Disconnect);

        assert_eq!(typing.active_typer(), None);
        assert!(!typing.is_composing());
    }
}
