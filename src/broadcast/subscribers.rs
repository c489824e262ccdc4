//! Connections receiving the ambient audio broadcast

use std::collections::HashSet;

use tokio::sync::RwLock;

use crate::connection::ConnectionId;

/// Set of audio subscribers, independent of stream rooms
#[derive(Default)]
pub struct SubscriberSet {
    members: RwLock<HashSet<ConnectionId>>,
}

impl SubscriberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the connection was already subscribed
    pub async fn subscribe(&self, conn: ConnectionId) -> bool {
        let added = self.members.write().await.insert(conn);
        if added {
            tracing::debug!(connection = %conn, "Audio subscribed");
        }
        added
    }

    /// Returns false if the connection was not subscribed
    pub async fn unsubscribe(&self, conn: ConnectionId) -> bool {
        self.members.write().await.remove(&conn)
    }

    pub async fn contains(&self, conn: ConnectionId) -> bool {
        self.members.read().await.contains(&conn)
    }

    /// Current subscribers, taken once per frame
    pub async fn snapshot(&self) -> Vec<ConnectionId> {
        self.members.read().await.iter().copied().collect()
    }

    pub async fn len(&self) -> usize {
        self.members.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.members.read().await.is_empty()
    }
}
