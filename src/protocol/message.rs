//! Messages exchanged over the persistent channel
//!
//! Both directions are JSON objects tagged by `type`. SDP and ICE payloads
//! are carried as opaque JSON values and never inspected.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::call::{CallId, CallKind};
use crate::connection::{ConnectionId, UserId};
use crate::notify::Notification;
use crate::stream::{Role, StreamId};

/// What a signaling message is addressed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTarget {
    /// A peer-to-peer call
    Call(CallId),
    /// A live broadcast room
    Stream(StreamId),
}

/// An opaque session-setup payload
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
}

impl Signal {
    /// Short name used in log fields
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::Offer(_) => "offer",
            Signal::Answer(_) => "answer",
            Signal::IceCandidate(_) => "ice_candidate",
        }
    }
}

/// Messages sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Bind this connection to a user
    ///
    /// The token must resolve to `user_id` unless the connection is already
    /// bound to that user.
    AttachUserSession {
        user_id: UserId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
    },

    /// Join a broadcast room as broadcaster or listener
    JoinRoom { stream_id: StreamId, role: Role },

    SendOffer { target: SignalTarget, sdp: Value },

    SendAnswer { target: SignalTarget, sdp: Value },

    SendIceCandidate { target: SignalTarget, candidate: Value },

    /// Hang up a ringing or active call
    EndCall { call_id: CallId },

    /// Start receiving the ambient audio broadcast
    SubscribeAudio,

    /// Stop receiving the ambient audio broadcast
    UnsubscribeAudio,
}

impl ClientMessage {
    /// Parse a JSON text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Error codes surfaced to the requesting client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Busy,
    Offline,
    Unauthenticated,
    AlreadyAttached,
    BroadcasterAlreadyPresent,
    Forbidden,
    NotFound,
    BadRequest,
}

/// Events sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    // ========== Session ==========
    /// Connection is now bound to a user
    Attached {
        connection_id: ConnectionId,
        user_id: UserId,
    },

    /// A request on this connection failed
    Error { code: ErrorCode, message: String },

    // ========== Calls ==========
    IncomingCall {
        call_id: CallId,
        from_user_id: UserId,
        call_type: CallKind,
    },

    CallAccepted { call_id: CallId },

    CallRejected { call_id: CallId },

    RtcOffer {
        call_id: CallId,
        from_user_id: UserId,
        sdp: Value,
    },

    RtcAnswer {
        call_id: CallId,
        from_user_id: UserId,
        sdp: Value,
    },

    RtcIceCandidate {
        call_id: CallId,
        from_user_id: UserId,
        candidate: Value,
    },

    /// Tear down the local peer connection
    RtcHangup { call_id: CallId },

    // ========== Broadcast rooms ==========
    BroadcasterReady { stream_id: StreamId },

    /// Sent to the broadcaster when a listener arrives after it
    ListenerJoined {
        stream_id: StreamId,
        listener: ConnectionId,
    },

    ReceiveOffer { stream_id: StreamId, sdp: Value },

    ReceiveAnswer {
        stream_id: StreamId,
        from: ConnectionId,
        sdp: Value,
    },

    ReceiveIceCandidate {
        stream_id: StreamId,
        from: ConnectionId,
        candidate: Value,
    },

    StreamEnded { stream_id: StreamId },

    // ========== Notifications ==========
    Notification {
        kind: String,
        data: Value,
        created_at: DateTime<Utc>,
    },
}

impl ServerEvent {
    /// Build an error event
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

impl From<Notification> for ServerEvent {
    fn from(notification: Notification) -> Self {
        ServerEvent::Notification {
            kind: notification.kind,
            data: notification.data,
            created_at: notification.created_at,
        }
    }
}
