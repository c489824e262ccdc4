//! Stream error types

use thiserror::Error;

use super::room::StreamId;

/// Error type for room and stream slot operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    /// Room already has a broadcaster
    #[error("stream {0} already has a broadcaster")]
    BroadcasterAlreadyPresent(StreamId),
    /// Sender is not the room's broadcaster
    #[error("not the broadcaster of stream {0}")]
    NotBroadcaster(StreamId),
    /// Sender is not a member of the room
    #[error("not a member of stream {0}")]
    UnknownSession(StreamId),
    /// No stream slot with this id
    #[error("stream not found: {0}")]
    UnknownStream(StreamId),
    /// Stream slot belongs to another user
    #[error("not the owner of stream {0}")]
    NotOwner(StreamId),
}
