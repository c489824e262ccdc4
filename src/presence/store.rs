//! Presence registry implementation

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

use crate::connection::{ConnectionId, UserId};

#[derive(Default)]
struct PresenceTable {
    /// User -> live connections
    users: HashMap<UserId, HashSet<ConnectionId>>,
    /// Connection -> owning user, keeps each connection under one user
    owners: HashMap<ConnectionId, UserId>,
}

impl PresenceTable {
    fn detach(&mut self, user: &UserId, conn: ConnectionId) -> usize {
        let Some(conns) = self.users.get_mut(user) else {
            return 0;
        };

        conns.remove(&conn);
        let remaining = conns.len();
        if remaining == 0 {
            self.users.remove(user);
        }
        remaining
    }
}

/// Maps each user to the set of connections it currently holds
///
/// Ephemeral and process-local: clients re-attach after a restart.
pub struct PresenceRegistry {
    table: RwLock<PresenceTable>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            table: RwLock::new(PresenceTable::default()),
        }
    }

    /// Record that `user` holds `conn`
    ///
    /// If the connection was listed under another user it moves (last writer wins).
    pub async fn add(&self, user: &UserId, conn: ConnectionId) {
        let mut table = self.table.write().await;

        if let Some(previous) = table.owners.insert(conn, user.clone()) {
            if previous != *user {
                tracing::warn!(
                    connection = %conn,
                    previous = %previous,
                    user = %user,
                    "Connection moved between users"
                );
                table.detach(&previous, conn);
            }
        }

        let conns = table.users.entry(user.clone()).or_default();
        conns.insert(conn);

        tracing::debug!(user = %user, connection = %conn, connections = conns.len(), "Presence added");
    }

    /// Remove one connection of a user
    ///
    /// Returns the number of connections the user still holds; 0 means the
    /// user is now fully offline and has no entry.
    pub async fn remove(&self, user: &UserId, conn: ConnectionId) -> usize {
        let mut table = self.table.write().await;

        if table.owners.get(&conn) == Some(user) {
            table.owners.remove(&conn);
        }
        let remaining = table.detach(user, conn);

        tracing::debug!(user = %user, connection = %conn, remaining = remaining, "Presence removed");
        remaining
    }

    /// Get every live connection of a user (empty if offline)
    pub async fn lookup(&self, user: &UserId) -> HashSet<ConnectionId> {
        self.table
            .read()
            .await
            .users
            .get(user)
            .cloned()
            .unwrap_or_default()
    }

    /// Remove a user entirely, returning the connections it held
    pub async fn remove_all(&self, user: &UserId) -> HashSet<ConnectionId> {
        let mut table = self.table.write().await;
        let conns = table.users.remove(user).unwrap_or_default();

        for conn in &conns {
            table.owners.remove(conn);
        }

        conns
    }

    /// Check whether a user holds at least one connection
    pub async fn is_online(&self, user: &UserId) -> bool {
        self.table.read().await.users.contains_key(user)
    }

    /// Number of users with at least one connection
    pub async fn online_users(&self) -> usize {
        self.table.read().await.users.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
