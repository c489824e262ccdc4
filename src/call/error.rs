//! Call error types

use thiserror::Error;

use super::session::CallId;
use crate::connection::UserId;

/// Error type for call operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallError {
    /// User is already ringing or in a call
    #[error("user {0} is busy")]
    Busy(UserId),
    /// Callee has no live connections
    #[error("user {0} is offline")]
    Offline(UserId),
    /// Caller and callee are the same user
    #[error("cannot call yourself")]
    CannotCallSelf,
    /// Call id unknown, already ended, or the requester is not a party
    #[error("unknown call: {0}")]
    UnknownSession(CallId),
}
