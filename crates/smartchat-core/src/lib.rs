//! Core types for smartchat.
//!
//! This crate provides the foundational types shared by the client and the
//! room server:
//!
//! - **Names**: validated `Username` and `RoomName` types, plus the reserved
//!   `AI` pseudo-user
//! - **Protocol**: the closed set of outbound and inbound events with their
//!   payload shapes
//! - **Error types**: protocol and validation errors
//!
//! # Example
//!
//! ```
//! use smartchat_core::{ClientEvent, RoomName, Username};
//!
//! let username = Username::parse("alice").unwrap();
//! let room = RoomName::parse("lobby").unwrap();
//!
//! let join = ClientEvent::join(&username, &room);
//! assert_eq!(join.name(), "join");
//! assert_eq!(join.payload()["room"], "lobby");
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod names;
pub mod protocol;

pub use error::{NameError, ProtocolError, Result};
pub use names::{RoomName, Username, AI_USERNAME};
pub use protocol::{
    AskAiPayload, ClientEvent, EventKind, MemberPayload, Message, ServerEvent, UserPayload,
};
