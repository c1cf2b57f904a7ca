//! Online users in the current room.

use std::collections::HashSet;

use smartchat_core::{EventKind, ServerEvent, AI_USERNAME};

use crate::connection::EventSink;

/// Set of users currently in the room.
///
/// Membership is a set: adding twice is a no-op, removing an absent user is
/// a no-op, and a snapshot replaces everything.
#[derive(Debug, Clone, Default)]
pub struct PresenceTracker {
    users: HashSet<String>,
    stale: bool,
}

impl PresenceTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user. Returns `false` if they were already present.
    pub fn add_user(&mut self, username: &str) -> bool {
        self.users.insert(username.to_string())
    }

    /// Remove a user. Returns `false` if they were not present.
    pub fn remove_user(&mut self, username: &str) -> bool {
        self.users.remove(username)
    }

    /// Replace the whole set with an authoritative snapshot.
    pub fn replace_all<I>(&mut self, usernames: I)
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        self.users = usernames.into_iter().map(Into::into).collect();
        self.stale = false;
    }

    /// Whether `username` is online.
    #[must_use]
    pub fn contains(&self, username: &str) -> bool {
        self.users.contains(username)
    }

    /// Number of online users.
    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Whether nobody is online.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Online users, in no particular order.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.users.iter().map(String::as_str)
    }

    /// Online users, sorted by name.
    #[must_use]
    pub fn sorted(&self) -> Vec<&str> {
        let mut users: Vec<&str> = self.users().collect();
        users.sort_unstable();
        users
    }

    /// Whether the set may have missed updates since the link dropped.
    #[must_use]
    pub const fn needs_resync(&self) -> bool {
        self.stale
    }
}

impl EventSink for PresenceTracker {
    const KINDS: &'static [EventKind] = &[
        EventKind::UserJoined,
        EventKind::UserLeft,
        EventKind::OnlineUsers,
        EventKind::ChatMessage,
        EventKind::Disconnect,
    ];

    fn apply(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::UserJoined(user) => {
                self.add_user(&user.username);
            }
            ServerEvent::UserLeft(user) => {
                self.remove_user(&user.username);
            }
            ServerEvent::OnlineUsers(users) => self.replace_all(users.iter().cloned()),
            ServerEvent::ChatMessage(message) if message.is_from_ai() => {
                self.add_user(AI_USERNAME);
            }
            ServerEvent::Disconnect => self.stale = true,
            _ => {}
        }
    }
}
