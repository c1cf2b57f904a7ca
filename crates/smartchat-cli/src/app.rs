//! Application state.
//!
//! The app has two screens: the join form and the room. All chat state lives
//! in the [`ChatClient`]; the app only keeps what the terminal needs on top of
//! it (text inputs, scroll position, status line).

use tokio::time::Instant;

use smartchat_client::command;
use smartchat_client::{ChatClient, ChatError, ConnectionState, Field, IdentityErrors, Submission};
use smartchat_core::ServerEvent;

/// Which screen is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Username and room form.
    Join,
    /// Joined room.
    Room,
}

/// Focused join-form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    /// Username input.
    Username,
    /// Room input.
    Room,
}

impl FormField {
    /// The other field.
    #[must_use]
    pub const fn toggle(self) -> Self {
        match self {
            Self::Username => Self::Room,
            Self::Room => Self::Username,
        }
    }
}

// =============================================================================
// Text Input
// =============================================================================

/// Single-line text input. The cursor counts characters, not bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextInput {
    text: String,
    cursor: usize,
}

impl TextInput {
    /// Create an input holding `text` with the cursor at the end.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        let text = text.into();
        let cursor = text.chars().count();
        Self { text, cursor }
    }

    /// Current text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Cursor position, in characters.
    #[must_use]
    pub const fn cursor(&self) -> usize {
        self.cursor
    }

    /// Whether the input is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn byte_index(&self, cursor: usize) -> usize {
        self.text
            .char_indices()
            .nth(cursor)
            .map_or(self.text.len(), |(index, _)| index)
    }

    fn len(&self) -> usize {
        self.text.chars().count()
    }

    /// Insert a character at the cursor.
    pub fn insert(&mut self, c: char) {
        let index = self.byte_index(self.cursor);
        self.text.insert(index, c);
        self.cursor += 1;
    }

    /// Delete the character before the cursor.
    pub fn delete_back(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
            let index = self.byte_index(self.cursor);
            self.text.remove(index);
        }
    }

    /// Delete the character at the cursor.
    pub fn delete_forward(&mut self) {
        if self.cursor < self.len() {
            let index = self.byte_index(self.cursor);
            self.text.remove(index);
        }
    }

    /// Delete back to the start of the previous word.
    pub fn delete_word(&mut self) {
        while self.cursor > 0 && self.char_before() == Some(' ') {
            self.delete_back();
        }
        while self.cursor > 0 && self.char_before() != Some(' ') {
            self.delete_back();
        }
    }

    fn char_before(&self) -> Option<char> {
        self.text.chars().nth(self.cursor.checked_sub(1)?)
    }

    /// Move the cursor left.
    pub fn left(&mut self) {
        self.cursor = self.cursor.saturating_sub(1);
    }

    /// Move the cursor right.
    pub fn right(&mut self) {
        if self.cursor < self.len() {
            self.cursor += 1;
        }
    }

    /// Move the cursor to the start.
    pub fn home(&mut self) {
        self.cursor = 0;
    }

    /// Move the cursor to the end.
    pub fn end(&mut self) {
        self.cursor = self.len();
    }

    /// Clear the input.
    pub fn clear(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }
}

// =============================================================================
// App
// =============================================================================

/// Terminal application state.
pub struct App {
    /// Chat client.
    pub client: ChatClient,
    /// Current screen.
    pub screen: Screen,
    /// Join form: username.
    pub username: TextInput,
    /// Join form: room.
    pub room: TextInput,
    /// Focused join-form field.
    pub field: FormField,
    /// Join form validation messages.
    pub form_errors: IdentityErrors,
    /// Chat input.
    pub input: TextInput,
    /// Lines scrolled up from the bottom of the chat.
    pub chat_scroll: usize,
    /// Status message.
    pub status_message: Option<String>,
    /// Error message.
    pub error_message: Option<String>,
    /// Whether the app should exit.
    pub should_quit: bool,
    /// Animation frame counter for the assistant spinner.
    pub animation_frame: usize,
    link_lost: bool,
}

impl App {
    /// Create the app, prefilling the join form from the saved identity.
    #[must_use]
    pub fn new(client: ChatClient) -> Self {
        let saved = client.saved_identity().unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read saved identity");
            smartchat_client::SavedIdentity::default()
        });

        Self {
            client,
            screen: Screen::Join,
            username: TextInput::new(saved.username.unwrap_or_default()),
            room: TextInput::new(saved.room.unwrap_or_default()),
            field: FormField::Username,
            form_errors: IdentityErrors::new(),
            input: TextInput::default(),
            chat_scroll: 0,
            status_message: None,
            error_message: None,
            should_quit: false,
            animation_frame: 0,
            link_lost: false,
        }
    }

    /// Server endpoint.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.client.config().endpoint
    }

    /// Set the status message (also clears any error).
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
        self.error_message = None;
    }

    /// Set the error message.
    pub fn set_error(&mut self, message: impl Into<String>) {
        self.error_message = Some(message.into());
    }

    /// Clear the error message.
    pub fn clear_error(&mut self) {
        self.error_message = None;
    }

    /// Tick the animation frame (call on each render).
    pub fn tick_animation(&mut self) {
        self.animation_frame = self.animation_frame.wrapping_add(1);
    }

    /// Current spinner character.
    #[must_use]
    pub fn spinner_char(&self) -> &'static str {
        const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
        SPINNER[self.animation_frame % SPINNER.len()]
    }

    /// The join-form input that has focus.
    pub fn focused_field(&mut self) -> &mut TextInput {
        match self.field {
            FormField::Username => &mut self.username,
            FormField::Room => &mut self.room,
        }
    }

    /// Scroll chat up (view older messages).
    pub fn scroll_chat_up(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_add(amount);
    }

    /// Scroll chat down (view newer messages).
    pub fn scroll_chat_down(&mut self, amount: usize) {
        self.chat_scroll = self.chat_scroll.saturating_sub(amount);
    }

    // =========================================================================
    // Session Operations
    // =========================================================================

    /// Connect to the server, reporting failure on the status line.
    pub async fn connect(&mut self) -> bool {
        if self.client.connection_state() == ConnectionState::Connected {
            return true;
        }

        self.set_status("Connecting...");
        match self.client.connect().await {
            Ok(()) => {
                self.set_status("Connected");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, "Connect failed");
                self.client.take_error();
                self.status_message = None;
                self.set_error(ChatError::ConnectionUnavailable.to_string());
                false
            }
        }
    }

    /// Submit the join form.
    pub async fn submit_join(&mut self) {
        self.form_errors = self
            .client
            .set_identity(self.username.as_str(), self.room.as_str());
        if !self.form_errors.is_empty() {
            return;
        }

        if !self.connect().await {
            self.clear_error();
            self.form_errors
                .insert(Field::Submit, ChatError::ConnectionUnavailable.to_string());
            return;
        }

        match self.client.join() {
            Ok(()) => self.set_status(format!("Joining {}...", self.room.as_str())),
            Err(e) => {
                self.form_errors
                    .insert(e.field().unwrap_or(Field::Submit), e.to_string());
            }
        }
    }

    /// Abandon a join the server never confirmed.
    pub fn check_join_timeout(&mut self) {
        if self.client.check_join_timeout(Instant::now()) {
            self.status_message = None;
            self.surface_errors();
        }
    }

    /// Submit the chat input.
    pub async fn submit_message(&mut self) {
        match self.input.as_str().trim() {
            "/leave" => {
                self.input.clear();
                self.leave();
                return;
            }
            "/quit" => {
                self.should_quit = true;
                return;
            }
            "/reconnect" => {
                self.input.clear();
                self.connect().await;
                return;
            }
            _ => {}
        }

        match self.client.submit(self.input.as_str()) {
            Ok(Submission::Ignored) => {}
            Ok(Submission::Chat) => {
                self.input.clear();
                self.chat_scroll = 0;
                self.clear_error();
            }
            Ok(Submission::AskAi { .. }) => {
                self.input.clear();
                self.chat_scroll = 0;
                self.set_status("Asked the assistant");
            }
            Err(ChatError::RequestPending) => {
                self.set_error("Wait for the assistant to answer first");
            }
            Err(e) => self.set_error(e.to_string()),
        }
    }

    /// Whether the chat input is an assistant command.
    #[must_use]
    pub fn ai_mode(&self) -> bool {
        command::parse(self.input.as_str()).is_ai_command()
    }

    /// Whether the assistant command has no prompt yet.
    #[must_use]
    pub fn ai_prompt_is_empty(&self) -> bool {
        command::parse(self.input.as_str())
            .prompt()
            .is_some_and(str::is_empty)
    }

    /// Report a chat input edit so typing signals go out.
    pub fn input_edited(&mut self) {
        self.client.input_changed(self.input.as_str());
    }

    /// Leave the room and return to the join form.
    pub fn leave(&mut self) {
        let room = self.client.session().room;
        self.client.leave();
        self.screen = Screen::Join;
        self.input.clear();
        self.chat_scroll = 0;
        self.form_errors.clear();
        match room {
            Some(room) => self.set_status(format!("Left {room}")),
            None => self.set_status("Disconnected"),
        }
    }

    /// Leave cleanly before exiting.
    pub fn shutdown(&mut self) {
        if self.client.connection_state() != ConnectionState::Disconnected {
            self.client.leave();
        }
    }

    // =========================================================================
    // Server Events
    // =========================================================================

    /// Update the screen after the client applied `event`.
    pub fn on_server_event(&mut self, event: &ServerEvent) {
        match event {
            ServerEvent::Joined => {
                if self.screen == Screen::Join && self.client.session().is_joined() {
                    self.screen = Screen::Room;
                    self.chat_scroll = 0;
                    self.form_errors.clear();
                    self.set_status(format!("Joined {}", self.room.as_str()));
                }
            }
            ServerEvent::UserJoined(user) => self.set_status(format!("{} joined", user.username)),
            ServerEvent::UserLeft(user) => self.set_status(format!("{} left", user.username)),
            ServerEvent::Disconnect => self.set_error("Connection lost, reconnecting..."),
            ServerEvent::Connect => self.set_status("Reconnected"),
            _ => {}
        }
        self.surface_errors();
    }

    /// Report a link that ended for good while in a room.
    pub fn check_connection(&mut self) {
        let lost = self.screen == Screen::Room
            && matches!(
                self.client.connection_state(),
                ConnectionState::Disconnected | ConnectionState::Error
            );
        if lost && !self.link_lost {
            self.status_message = None;
            self.set_error("Disconnected from the server. Type /reconnect to retry");
        }
        self.link_lost = lost;
    }

    fn surface_errors(&mut self) {
        let Some(error) = self.client.take_error() else {
            return;
        };
        match self.screen {
            Screen::Join => {
                self.status_message = None;
                self.form_errors.insert(Field::Submit, error.to_string());
            }
            Screen::Room => self.set_error(error.to_string()),
        }
    }
}
