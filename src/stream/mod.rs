//! Live broadcast rooms
//!
//! A room has at most one broadcaster and any number of listeners. The
//! server only relays the session-setup messages between them; media flows
//! peer to peer.
//!
//! ```text
//!   Broadcaster ── offer ──► RoomRegistry ──► every listener
//!   Listener ─── answer ──► RoomRegistry ──► broadcaster
//! ```
//!
//! The broadcaster disconnecting ends the room and every listener receives
//! `StreamEnded`.

pub mod error;
pub mod room;
pub mod slot;
pub mod store;

pub use error::StreamError;
pub use room::{Membership, Role, RoomState, RoomStats, StreamId, StreamRoom};
pub use slot::{StreamSlot, StreamSlots};
pub use store::RoomRegistry;
