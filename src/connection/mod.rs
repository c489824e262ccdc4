//! Transport connections
//!
//! A connection is created unbound when the transport connects, bound to a
//! user by an explicit attach, and destroyed on disconnect. The
//! [`ConnectionTable`] holds each connection's bounded outbound queue; a slow
//! or dead destination drops frames instead of stalling the sender.

pub mod error;
pub mod id;
pub mod outbound;
pub mod table;

pub use error::ConnectionError;
pub use id::{ConnectionId, UserId};
pub use outbound::{Outbound, OutboundReceiver};
pub use table::{ClosedConnection, ConnectionTable};
