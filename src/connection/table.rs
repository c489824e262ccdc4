//! Live connection table
//!
//! Owns the outbound queue of every open connection and the user each one is
//! bound to. All other components address connections by id and deliver
//! through this table.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::error::ConnectionError;
use super::id::{ConnectionId, UserId};
use super::outbound::{Outbound, OutboundReceiver};
use crate::protocol::ServerEvent;

/// Per-connection state
struct ConnectionEntry {
    /// User bound by attach (None until attached)
    user: Option<UserId>,

    /// Signaling and notification queue, drained first
    events: mpsc::Sender<ServerEvent>,

    /// Broadcast audio queue
    audio: mpsc::Sender<Bytes>,

    /// When the transport connected
    opened_at: Instant,
}

/// Result of closing a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedConnection {
    /// Connection that was closed
    pub id: ConnectionId,
    /// User the connection was bound to, if it ever attached
    pub user: Option<UserId>,
    /// How long the connection was open
    pub duration: Duration,
}

/// Registry of open transport connections
pub struct ConnectionTable {
    connections: RwLock<HashMap<ConnectionId, ConnectionEntry>>,
    next_id: AtomicU64,
    dropped_frames: AtomicU64,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            dropped_frames: AtomicU64::new(0),
        }
    }

    /// Register a new, unbound connection
    ///
    /// Returns the allocated id and the receiving half of its outbound
    /// queues. Events and audio each get `capacity` slots.
    pub async fn open(&self, capacity: usize) -> (ConnectionId, OutboundReceiver) {
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (events, events_rx) = mpsc::channel(capacity.max(1));
        let (audio, audio_rx) = mpsc::channel(capacity.max(1));

        self.connections.write().await.insert(
            id,
            ConnectionEntry {
                user: None,
                events,
                audio,
                opened_at: Instant::now(),
            },
        );

        tracing::debug!(connection = %id, "Connection opened");
        (id, OutboundReceiver::new(events_rx, audio_rx))
    }

    /// Bind a connection to a user
    ///
    /// The binding is immutable: attaching the same user again is a no-op,
    /// attaching a different user fails.
    pub async fn attach(&self, id: ConnectionId, user: &UserId) -> Result<(), ConnectionError> {
        let mut connections = self.connections.write().await;
        let entry = connections
            .get_mut(&id)
            .ok_or(ConnectionError::UnknownConnection(id))?;

        match entry.user {
            Some(ref bound) if bound == user => Ok(()),
            Some(ref bound) => Err(ConnectionError::AlreadyAttached {
                connection: id,
                user: bound.clone(),
            }),
            None => {
                entry.user = Some(user.clone());
                tracing::info!(connection = %id, user = %user, "Connection attached");
                Ok(())
            }
        }
    }

    /// Get the user bound to a connection
    pub async fn user_of(&self, id: ConnectionId) -> Option<UserId> {
        self.connections
            .read()
            .await
            .get(&id)
            .and_then(|entry| entry.user.clone())
    }

    /// Check whether a connection is still open
    pub async fn is_open(&self, id: ConnectionId) -> bool {
        self.connections.read().await.contains_key(&id)
    }

    /// Remove a connection
    ///
    /// Returns `None` if the connection was already closed, which makes
    /// disconnect handling safe to invoke more than once.
    pub async fn close(&self, id: ConnectionId) -> Option<ClosedConnection> {
        let entry = self.connections.write().await.remove(&id)?;

        Some(ClosedConnection {
            id,
            user: entry.user,
            duration: entry.opened_at.elapsed(),
        })
    }

    /// Queue a frame for one connection
    ///
    /// Never waits: a full queue drops the frame. Returns whether it was queued.
    pub async fn send(&self, id: ConnectionId, frame: Outbound) -> bool {
        let connections = self.connections.read().await;
        match connections.get(&id) {
            Some(entry) => self.deliver(id, entry, frame),
            None => {
                tracing::debug!(connection = %id, "Dropping frame for closed connection");
                false
            }
        }
    }

    /// Queue the same frame for many connections
    ///
    /// Each destination is attempted independently; returns how many accepted it.
    pub async fn send_many<I>(&self, ids: I, frame: Outbound) -> usize
    where
        I: IntoIterator<Item = ConnectionId>,
    {
        let connections = self.connections.read().await;
        let mut delivered = 0;

        for id in ids {
            if let Some(entry) = connections.get(&id) {
                if self.deliver(id, entry, frame.clone()) {
                    delivered += 1;
                }
            }
        }

        delivered
    }

    fn deliver(&self, id: ConnectionId, entry: &ConnectionEntry, frame: Outbound) -> bool {
        let (kind, full) = match frame {
            Outbound::Event(event) => match entry.events.try_send(event) {
                Ok(()) => return true,
                Err(e) => ("event", matches!(e, TrySendError::Full(_))),
            },
            Outbound::Audio(pcm) => match entry.audio.try_send(pcm) {
                Ok(()) => return true,
                Err(e) => ("audio", matches!(e, TrySendError::Full(_))),
            },
        };

        if full {
            self.dropped_frames.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(connection = %id, kind, "Outbound queue full, frame dropped");
        } else {
            tracing::debug!(connection = %id, kind, "Outbound queue closed");
        }
        false
    }

    /// Number of open connections
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Total frames dropped because a destination queue was full
    pub fn dropped_frames(&self) -> u64 {
        self.dropped_frames.load(Ordering::Relaxed)
    }
}

impl Default for ConnectionTable {
    fn default() -> Self {
        Self::new()
    }
}
