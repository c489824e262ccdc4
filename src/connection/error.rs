//! Connection error types

use thiserror::Error;

use super::id::{ConnectionId, UserId};

/// Error type for connection table operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// Connection is not open
    #[error("unknown connection: {0}")]
    UnknownConnection(ConnectionId),
    /// Connection is already bound to another user
    #[error("{connection} is already attached to user {user}")]
    AlreadyAttached { connection: ConnectionId, user: UserId },
}
