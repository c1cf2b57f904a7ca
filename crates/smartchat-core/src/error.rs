//! Common error types for smartchat.
//!
//! This module provides the error types shared by the protocol and name
//! validation layers.

use thiserror::Error;

/// A result type using `ProtocolError`.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while decoding inbound events at the protocol boundary.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The event name is not part of the protocol.
    #[error("unknown event: {0}")]
    UnknownEvent(String),

    /// The event name is known but the payload has the wrong shape.
    #[error("invalid payload for {event}: {source}")]
    InvalidPayload {
        /// Wire name of the event.
        event: &'static str,
        /// Underlying decoding error.
        #[source]
        source: serde_json::Error,
    },
}

/// Validation errors for user and room names.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The name is empty or whitespace only.
    #[error("name is required")]
    Empty,

    /// The name is shorter than the minimum length.
    #[error("name must be at least {min} characters")]
    TooShort {
        /// Minimum number of characters.
        min: usize,
    },

    /// The name is longer than the maximum length.
    #[error("name must be at most {max} characters")]
    TooLong {
        /// Maximum number of characters.
        max: usize,
    },
}
