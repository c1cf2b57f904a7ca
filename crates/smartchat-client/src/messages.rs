//! Chat history for the current room.

use smartchat_core::{EventKind, Message, ServerEvent};

use crate::connection::EventSink;

/// Append-only message list, in arrival order.
///
/// A history snapshot replaces the list wholesale. A log bound to a room
/// files untagged messages under that room.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    room: Option<String>,
    entries: Vec<Message>,
    stale: bool,
}

impl MessageLog {
    /// Create an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty log for `room`.
    #[must_use]
    pub fn for_room(room: impl Into<String>) -> Self {
        Self {
            room: Some(room.into()),
            ..Self::default()
        }
    }

    fn stamp(&self, message: &mut Message) {
        if message.room.is_empty() {
            if let Some(room) = &self.room {
                message.room.clone_from(room);
            }
        }
    }

    /// Append a message. Messages with a blank body are rejected.
    pub fn append(&mut self, mut message: Message) -> bool {
        if message.body.trim().is_empty() {
            tracing::debug!(sender = %message.sender, "Dropping message with empty body");
            return false;
        }
        self.stamp(&mut message);
        self.entries.push(message);
        true
    }

    /// Install an authoritative history, in server order.
    pub fn replace_all(&mut self, mut messages: Vec<Message>) {
        for message in &mut messages {
            self.stamp(message);
        }
        self.entries = messages;
        self.stale = false;
    }

    /// Messages tagged with `room`, in order.
    ///
    /// This is a view over the log; nothing is copied.
    pub fn query<'a>(&'a self, room: &'a str) -> impl Iterator<Item = &'a Message> + Clone + 'a {
        self.entries.iter().filter(move |message| message.room == room)
    }

    /// All messages, in order.
    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.entries.iter()
    }

    /// Most recent message.
    #[must_use]
    pub fn last(&self) -> Option<&Message> {
        self.entries.last()
    }

    /// Number of messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the log may have missed messages since the link dropped.
    #[must_use]
    pub const fn needs_resync(&self) -> bool {
        self.stale
    }
}

impl EventSink for MessageLog {
    const KINDS: &'static [EventKind] = &[
        EventKind::ChatMessage,
        EventKind::MessagesFetched,
        EventKind::Disconnect,
    ];

    fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::ChatMessage(message) => {
                self.append(message.clone());
            }
            ServerEvent::MessagesFetched(messages) => self.replace_all(messages.clone()),
            ServerEvent::Disconnect => self.stale = true,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appends_in_arrival_order() {
        let mut log = MessageLog::new();
        log.apply(&ServerEvent::ChatMessage(Message::new("bob", "lobby", "first")));
        log.apply(&ServerEvent::ChatMessage(Message::new("alice", "lobby", "second")));

        let bodies: Vec<&str> = log.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["first", "second"]);
    }

    #[test]
    fn blank_bodies_are_rejected() {
        let mut log = MessageLog::new();
        assert!(!log.append(Message::new("bob", "lobby", "")));
        assert!(!log.append(Message::new("bob", "lobby", "  \n ")));
        assert!(log.is_empty());
    }

    #[test]
    fn snapshot_replaces_history() {
        let mut log = MessageLog::new();
        log.append(Message::new("bob", "lobby", "old"));
        log.apply(&ServerEvent::MessagesFetched(vec![
            Message::new("carol", "lobby", "one"),
            Message::new("dave", "lobby", "two"),
        ]));

        let bodies: Vec<&str> = log.iter().map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["one", "two"]);
    }

    #[test]
    fn query_filters_by_room_lazily() {
        let mut log = MessageLog::new();
        log.append(Message::new("bob", "lobby", "a"));
        log.append(Message::new("bob", "other", "b"));
        log.append(Message::new("bob", "lobby", "c"));

        let view = log.query("lobby");
        assert_eq!(view.clone().count(), 2);
        let bodies: Vec<&str> = view.map(|m| m.body.as_str()).collect();
        assert_eq!(bodies, ["a", "c"]);
    }

    #[test]
    fn untagged_messages_join_the_bound_room() {
        let mut log = MessageLog::for_room("lobby");
        log.append(Message::new("AI", "", "answer"));
        log.append(Message::new("bob", "other", "elsewhere"));
        assert_eq!(log.query("lobby").count(), 1);

        log.replace_all(vec![Message::new("carol", "", "history")]);
        assert_eq!(log.query("lobby").map(|m| m.body.as_str()).collect::<Vec<_>>(), ["history"]);
    }

    #[test]
    fn unbound_log_keeps_empty_room() {
        let mut log = MessageLog::new();
        log.append(Message::new("AI", "", "answer"));
        assert_eq!(log.query("").count(), 1);
    }

    #[test]
    fn duplicates_are_kept() {
        let mut log = MessageLog::new();
        let message = Message::new("bob", "lobby", "again");
        log.append(message.clone());
        log.append(message);
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn disconnect_marks_stale_until_snapshot() {
        let mut log = MessageLog::new();
        log.apply(&ServerEvent::Disconnect);
        assert!(log.needs_resync());

        log.apply(&ServerEvent::MessagesFetched(Vec::new()));
        assert!(!log.needs_resync());
    }
}
