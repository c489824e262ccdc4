//! Stream room and membership types

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tokio::time::{Duration, Instant};
use uuid::Uuid;

use crate::connection::ConnectionId;

/// Identifier of a live broadcast
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Generate a fresh stream id
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for StreamId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Role a connection holds in a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Broadcaster,
    Listener,
}

/// Observable room state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomState {
    /// Listeners only, waiting for a broadcaster
    Empty,
    /// Broadcaster installed
    BroadcasterPresent,
    /// Broadcaster left or the stream was ended; the room is being removed
    Ended,
}

/// One live broadcast room
#[derive(Debug)]
pub struct StreamRoom {
    pub id: StreamId,

    /// Single broadcaster, if any
    pub broadcaster: Option<ConnectionId>,

    pub listeners: HashSet<ConnectionId>,

    /// When the first member joined
    pub created_at: Instant,

    pub state: RoomState,
}

impl StreamRoom {
    pub(super) fn new(id: StreamId) -> Self {
        Self {
            id,
            broadcaster: None,
            listeners: HashSet::new(),
            created_at: Instant::now(),
            state: RoomState::Empty,
        }
    }

    pub fn has_broadcaster(&self) -> bool {
        self.broadcaster.is_some()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Room has no members left
    pub fn is_vacant(&self) -> bool {
        self.broadcaster.is_none() && self.listeners.is_empty()
    }

    /// Every member, broadcaster included
    pub fn members(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.broadcaster
            .into_iter()
            .chain(self.listeners.iter().copied())
    }

    pub fn stats(&self) -> RoomStats {
        RoomStats {
            listener_count: self.listeners.len(),
            has_broadcaster: self.broadcaster.is_some(),
            state: self.state,
            age: self.created_at.elapsed(),
        }
    }
}

/// The room a connection belongs to and its role there
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub stream_id: StreamId,
    pub role: Role,
}

/// Room statistics snapshot
#[derive(Debug, Clone)]
pub struct RoomStats {
    pub listener_count: usize,
    pub has_broadcaster: bool,
    pub state: RoomState,
    pub age: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_wire_names() {
        assert_eq!(serde_json::to_string(&Role::Broadcaster).unwrap(), "\"broadcaster\"");
        assert_eq!(
            serde_json::from_str::<Role>("\"listener\"").unwrap(),
            Role::Listener
        );
    }

    #[tokio::test]
    async fn test_members_include_broadcaster() {
        let mut room = StreamRoom::new(StreamId::from("s1"));
        assert!(room.is_vacant());

        room.listeners.insert(ConnectionId(2));
        room.listeners.insert(ConnectionId(3));
        room.broadcaster = Some(ConnectionId(1));

        let mut members: Vec<_> = room.members().collect();
        members.sort();
        assert_eq!(members, vec![ConnectionId(1), ConnectionId(2), ConnectionId(3)]);

        let stats = room.stats();
        assert_eq!(stats.listener_count, 2);
        assert!(stats.has_broadcaster);
    }
}
