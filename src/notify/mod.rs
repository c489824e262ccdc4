//! Per-user real-time delivery
//!
//! The [`Notifier`] resolves a user to its live connections through the
//! presence registry and queues an event on each of them. Delivery is best
//! effort: an offline user receives nothing and that is not an error.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::connection::{ConnectionTable, Outbound, UserId};
use crate::presence::PresenceRegistry;
use crate::protocol::ServerEvent;

/// A platform event pushed to a user (new follower, comment, message...)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Event kind, defined by the producing service
    pub kind: String,
    /// Opaque event body
    pub data: Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a notification stamped with the current time
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
            created_at: Utc::now(),
        }
    }
}

/// Delivers events to every connection of a user
pub struct Notifier {
    presence: Arc<PresenceRegistry>,
    connections: Arc<ConnectionTable>,
}

impl Notifier {
    pub fn new(presence: Arc<PresenceRegistry>, connections: Arc<ConnectionTable>) -> Self {
        Self {
            presence,
            connections,
        }
    }

    /// Queue an event on all of a user's connections
    ///
    /// Returns the number of connections that accepted it (0 if offline).
    pub async fn send_to_user(&self, user: &UserId, event: ServerEvent) -> usize {
        let conns = self.presence.lookup(user).await;
        if conns.is_empty() {
            tracing::debug!(user = %user, "User offline, event not delivered");
            return 0;
        }

        self.connections
            .send_many(conns, Outbound::Event(event))
            .await
    }

    /// Push a notification to one user
    pub async fn notify(&self, user: &UserId, notification: Notification) -> usize {
        let kind = notification.kind.clone();
        let delivered = self.send_to_user(user, notification.into()).await;

        tracing::debug!(user = %user, kind = %kind, delivered = delivered, "Notification sent");
        delivered
    }

    /// Push the same notification to several users
    pub async fn notify_many(&self, users: &[UserId], notification: Notification) -> usize {
        let mut delivered = 0;
        for user in users {
            delivered += self.notify(user, notification.clone()).await;
        }
        delivered
    }
}
