//! Crate-level error type

use thiserror::Error;

use crate::call::CallError;
use crate::connection::ConnectionError;
use crate::protocol::ErrorCode;
use crate::stream::StreamError;

/// Error type for hub operations
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or unknown session token, or a request before attach
    #[error("unauthenticated")]
    Unauthenticated,

    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    /// Client message could not be parsed
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Code reported to the requesting client, if the error is surfaced at all
    ///
    /// Unknown sessions and relays from non-broadcasters are only logged.
    pub fn client_code(&self) -> Option<ErrorCode> {
        match self {
            Error::Unauthenticated => Some(ErrorCode::Unauthenticated),
            Error::Connection(ConnectionError::AlreadyAttached { .. }) => {
                Some(ErrorCode::AlreadyAttached)
            }
            Error::Connection(ConnectionError::UnknownConnection(_)) => None,
            Error::Call(CallError::Busy(_)) => Some(ErrorCode::Busy),
            Error::Call(CallError::Offline(_)) => Some(ErrorCode::Offline),
            Error::Call(CallError::CannotCallSelf) => Some(ErrorCode::BadRequest),
            Error::Call(CallError::UnknownSession(_)) => None,
            Error::Stream(StreamError::BroadcasterAlreadyPresent(_)) => {
                Some(ErrorCode::BroadcasterAlreadyPresent)
            }
            Error::Stream(StreamError::NotOwner(_)) => Some(ErrorCode::Forbidden),
            Error::Stream(StreamError::UnknownStream(_)) => Some(ErrorCode::NotFound),
            Error::Stream(StreamError::NotBroadcaster(_) | StreamError::UnknownSession(_)) => None,
            Error::Malformed(_) => Some(ErrorCode::BadRequest),
            Error::Io(_) => None,
        }
    }
}

/// Result type alias using the crate error
pub type Result<T> = std::result::Result<T, Error>;
