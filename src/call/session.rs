//! Call session types

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::connection::UserId;

/// Identifier of one call attempt
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    /// Generate a fresh, never repeating call id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for CallId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Media kind requested by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    #[default]
    Audio,
    Video,
}

/// Call lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Callee is being rung
    Ringing,
    /// Callee accepted, peers are negotiating or connected
    Active,
    /// Terminal
    Ended,
}

/// One call between two users
#[derive(Debug, Clone)]
pub struct CallSession {
    pub id: CallId,
    pub caller: UserId,
    pub callee: UserId,
    pub kind: CallKind,
    pub state: CallState,

    /// When the call was started
    pub created_at: Instant,

    /// When the callee accepted
    pub answered_at: Option<Instant>,

    /// Last signaling activity, used for idle reclamation
    pub last_activity: Instant,
}

impl CallSession {
    /// Create a ringing session
    pub fn new(id: CallId, caller: UserId, callee: UserId, kind: CallKind) -> Self {
        let now = Instant::now();
        Self {
            id,
            caller,
            callee,
            kind,
            state: CallState::Ringing,
            created_at: now,
            answered_at: None,
            last_activity: now,
        }
    }

    /// Transition Ringing -> Active
    ///
    /// Returns false if the call was not ringing.
    pub fn accept(&mut self) -> bool {
        if self.state != CallState::Ringing {
            return false;
        }

        let now = Instant::now();
        self.state = CallState::Active;
        self.answered_at = Some(now);
        self.last_activity = now;
        true
    }

    /// Mark the session terminal
    pub fn end(&mut self) {
        self.state = CallState::Ended;
    }

    /// Record signaling activity
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Check if the user is the caller or the callee
    pub fn involves(&self, user: &UserId) -> bool {
        self.caller == *user || self.callee == *user
    }

    /// Get the party opposite to `user`, if `user` is a party at all
    pub fn other_party(&self, user: &UserId) -> Option<&UserId> {
        if self.caller == *user {
            Some(&self.callee)
        } else if self.callee == *user {
            Some(&self.caller)
        } else {
            None
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.state == CallState::Ringing
    }

    pub fn is_active(&self) -> bool {
        self.state == CallState::Active
    }

    /// Get call duration since it was answered
    pub fn talk_time(&self) -> Option<Duration> {
        self.answered_at.map(|t| t.elapsed())
    }
}
