//! Room session synchronization for smartchat clients.
//!
//! This crate keeps a client's view of a chat room in step with the server:
//!
//! - **Connection**: owns the transport and fans inbound events out to
//!   scoped subscriptions
//! - **Session**: identity validation, persistence and the join handshake
//! - **Room state**: presence, message history, typing indicators and the
//!   assistant request lifecycle
//! - **Transport**: Socket.IO over WebSocket
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                        ChatClient                          │
//! │  ┌──────────────┐   ┌──────────────────────────────────┐  │
//! │  │ SessionStore │   │ RoomScope (per join)              │  │
//! │  │  identity    │   │  Presence · Messages · Typing · AI│  │
//! │  └──────────────┘   └──────────────────────────────────┘  │
//! │           ▲ subscribe            ▲ subscribe               │
//! │  ┌────────┴──────────────────────┴─────────────────────┐  │
//! │  │        ConnectionManager / Channel                    │  │
//! │  └──────────────────────────┬──────────────────────────┘  │
//! └─────────────────────────────┼─────────────────────────────┘
//!                               ▼
//!                     Connector (WebSocket, mock)
//! ```
//!
//! # Example
//!
//! ```no_run
//! use smartchat_client::{ChatClient, ClientConfig, MemoryIdentityStore};
//!
//! # async fn example() -> Result<(), smartchat_client::ChatError> {
//! let config = ClientConfig::with_endpoint("http://localhost:3000");
//! let mut client = ChatClient::websocket(config, Box::new(MemoryIdentityStore::new()));
//!
//! client.connect().await?;
//! assert!(client.set_identity("alice", "lobby").is_empty());
//! client.join()?;
//!
//! while let Some(event) = client.next_event().await {
//!     if client.session().is_joined() {
//!         client.submit("/ai say hello")?;
//!         break;
//!     }
//!     println!("{}", event.name());
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod ai;
pub mod client;
pub mod codec;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod messages;
pub mod presence;
pub mod session;
pub mod store;
pub mod typing;
pub mod ws;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use ai::{AiRequestCoordinator, AiStatus, Outgoing, Submission};
pub use client::{ChatClient, Session};
pub use command::Command;
pub use config::{ClientConfig, ConnectOptions};
pub use connection::{
    Channel, ConnectionManager, ConnectionState, Connector, EventSink, Subscription,
    TransportError, TransportEvent, TransportLink,
};
pub use error::{ChatError, Result};
pub use messages::MessageLog;
pub use presence::PresenceTracker;
pub use session::{Field, Identity, IdentityErrors, JoinState, SavedIdentity, SessionStore};
pub use store::{FileIdentityStore, IdentityStore, MemoryIdentityStore, StoreError};
pub use typing::TypingCoordinator;
pub use ws::WsConnector;
