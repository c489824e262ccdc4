//! Real-time core for a social app
//!
//! - Presence: which connections each user currently holds
//! - Call signaling: ring, accept, reject and WebRTC relay between two users
//! - Stream rooms: one broadcaster, many listeners, signaling relayed per room
//! - Audio broadcast: a playlist decoded to PCM and paced out to subscribers
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use realtime_rs::{RelayServer, ServerConfig, TokenTable};
//!
//! # async fn run() -> realtime_rs::Result<()> {
//! let tokens = Arc::new(TokenTable::new());
//! let server = RelayServer::new(ServerConfig::default(), tokens);
//! server.run().await
//! # }
//! ```

pub mod broadcast;
pub mod call;
pub mod connection;
pub mod error;
pub mod notify;
pub mod presence;
pub mod protocol;
pub mod server;
pub mod stats;
pub mod stream;

pub use call::{CallId, CallKind, CallRegistry};
pub use connection::{ConnectionId, ConnectionTable, UserId};
pub use error::{Error, Result};
pub use presence::PresenceRegistry;
pub use server::{Hub, RelayServer, ServerConfig, SessionResolver, TokenTable};
pub use stream::{RoomRegistry, StreamId};
