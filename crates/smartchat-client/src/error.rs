//! Client error types.
//!
//! Every error here is recoverable: the user can retry, and no variant leaves
//! the session half-joined.

use thiserror::Error;

use smartchat_core::ProtocolError;

use crate::session::Field;
use crate::store::StoreError;

/// A result type using `ChatError`.
pub type Result<T> = std::result::Result<T, ChatError>;

/// Errors surfaced to the user interface.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// An identity field failed validation.
    #[error("{message}")]
    Validation {
        /// Offending field.
        field: Field,
        /// Message shown next to the field.
        message: String,
    },

    /// The action needs a connected transport.
    #[error("Unable to connect to the server")]
    ConnectionUnavailable,

    /// Opening the transport failed.
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    /// Error relayed from the server.
    #[error("{0}")]
    Server(String),

    /// The join acknowledgment did not arrive in time.
    #[error("timed out waiting for the server to confirm the join")]
    Timeout,

    /// The action needs a joined room.
    #[error("not in a room")]
    NotJoined,

    /// An assistant request is still pending.
    #[error("the assistant is still answering")]
    RequestPending,

    /// An inbound event did not match the protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The identity store failed.
    #[error("identity store error: {0}")]
    Store(String),
}

impl ChatError {
    /// Identity field the error belongs to, if it is shown inline.
    #[must_use]
    pub const fn field(&self) -> Option<Field> {
        match self {
            Self::Validation { field, .. } => Some(*field),
            _ => None,
        }
    }

    /// Whether the user can retry after this error.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        true
    }

    /// Short machine-readable code for this error.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::ConnectionUnavailable => "connection_unavailable",
            Self::ConnectFailed(_) => "connect_failed",
            Self::Server(_) => "server_error",
            Self::Timeout => "timeout",
            Self::NotJoined => "not_joined",
            Self::RequestPending => "request_pending",
            Self::Protocol(_) => "protocol_error",
            Self::Store(_) => "store_error",
        }
    }
}

impl From<ProtocolError> for ChatError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        Self::Store(err.to_string())
    }
}
