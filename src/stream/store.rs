//! Room registry implementation
//!
//! Tracks every live broadcast room and the single membership each
//! connection may hold. Events produced while the table is locked are
//! collected and delivered after the lock is released.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;

use super::error::StreamError;
use super::room::{Membership, Role, RoomState, RoomStats, StreamId, StreamRoom};
use crate::connection::{ConnectionId, ConnectionTable, Outbound};
use crate::protocol::{ServerEvent, Signal};

type Delivery = (ConnectionId, ServerEvent);

#[derive(Default)]
struct RoomTable {
    rooms: HashMap<StreamId, StreamRoom>,
    memberships: HashMap<ConnectionId, Membership>,
}

impl RoomTable {
    /// Drop a connection's membership
    ///
    /// A leaving broadcaster takes the room down with it and every listener
    /// is queued a `StreamEnded`.
    fn leave(&mut self, conn: ConnectionId, deliveries: &mut Vec<Delivery>) -> Option<Membership> {
        let membership = self.memberships.remove(&conn)?;
        let stream_id = &membership.stream_id;

        match membership.role {
            Role::Broadcaster => {
                if let Some(mut room) = self.rooms.remove(stream_id) {
                    room.state = RoomState::Ended;
                    room.broadcaster = None;

                    for listener in room.listeners.drain() {
                        self.memberships.remove(&listener);
                        deliveries.push((
                            listener,
                            ServerEvent::StreamEnded {
                                stream_id: stream_id.clone(),
                            },
                        ));
                    }
                }
            }
            Role::Listener => {
                if let Some(room) = self.rooms.get_mut(stream_id) {
                    room.listeners.remove(&conn);
                    if room.is_vacant() {
                        self.rooms.remove(stream_id);
                    }
                }
            }
        }

        Some(membership)
    }
}

/// Registry of live broadcast rooms
pub struct RoomRegistry {
    rooms: RwLock<RoomTable>,
    connections: Arc<ConnectionTable>,
}

impl RoomRegistry {
    pub fn new(connections: Arc<ConnectionTable>) -> Self {
        Self {
            rooms: RwLock::new(RoomTable::default()),
            connections,
        }
    }

    /// Join a room, creating it on first join
    ///
    /// Listener joins always succeed. A broadcaster join fails if the room
    /// already has a different broadcaster; the failed connection gains no
    /// membership. A connection already in another room (or holding another
    /// role) leaves it first.
    pub async fn join_room(
        &self,
        stream_id: &StreamId,
        conn: ConnectionId,
        role: Role,
    ) -> Result<(), StreamError> {
        let mut deliveries = Vec::new();

        {
            let mut guard = self.rooms.write().await;
            let table = &mut *guard;

            if let Some(current) = table.memberships.get(&conn) {
                if current.stream_id == *stream_id && current.role == role {
                    return Ok(());
                }
            }

            if role == Role::Broadcaster {
                let taken = table
                    .rooms
                    .get(stream_id)
                    .and_then(|room| room.broadcaster)
                    .is_some_and(|existing| existing != conn);
                if taken {
                    tracing::debug!(stream = %stream_id, connection = %conn, "Broadcaster slot taken");
                    return Err(StreamError::BroadcasterAlreadyPresent(stream_id.clone()));
                }
            }

            table.leave(conn, &mut deliveries);

            let room = table
                .rooms
                .entry(stream_id.clone())
                .or_insert_with(|| StreamRoom::new(stream_id.clone()));

            match role {
                Role::Broadcaster => {
                    room.broadcaster = Some(conn);
                    room.state = RoomState::BroadcasterPresent;

                    for listener in &room.listeners {
                        deliveries.push((
                            *listener,
                            ServerEvent::BroadcasterReady {
                                stream_id: stream_id.clone(),
                            },
                        ));
                    }

                    tracing::info!(
                        stream = %stream_id,
                        connection = %conn,
                        listeners = room.listener_count(),
                        "Broadcaster joined"
                    );
                }
                Role::Listener => {
                    room.listeners.insert(conn);

                    if let Some(broadcaster) = room.broadcaster {
                        deliveries.push((
                            conn,
                            ServerEvent::BroadcasterReady {
                                stream_id: stream_id.clone(),
                            },
                        ));
                        deliveries.push((
                            broadcaster,
                            ServerEvent::ListenerJoined {
                                stream_id: stream_id.clone(),
                                listener: conn,
                            },
                        ));
                    }

                    tracing::debug!(
                        stream = %stream_id,
                        connection = %conn,
                        listeners = room.listener_count(),
                        "Listener joined"
                    );
                }
            }

            table.memberships.insert(
                conn,
                Membership {
                    stream_id: stream_id.clone(),
                    role,
                },
            );
        }

        self.flush(deliveries).await;
        Ok(())
    }

    /// Route a signaling payload within a room
    ///
    /// Offers go from the broadcaster to every listener. Answers go from a
    /// listener to the broadcaster. ICE candidates go from the broadcaster to
    /// every listener, or from a listener to the broadcaster. Without a
    /// broadcaster, listener payloads are dropped. Returns the number of
    /// connections reached.
    pub async fn relay(
        &self,
        stream_id: &StreamId,
        sender: ConnectionId,
        signal: Signal,
    ) -> Result<usize, StreamError> {
        let kind = signal.kind();

        let (targets, event) = {
            let table = self.rooms.read().await;
            let role = match table.memberships.get(&sender) {
                Some(m) if m.stream_id == *stream_id => m.role,
                _ => return Err(StreamError::UnknownSession(stream_id.clone())),
            };
            let room = table
                .rooms
                .get(stream_id)
                .ok_or_else(|| StreamError::UnknownSession(stream_id.clone()))?;

            let stream_id = stream_id.clone();
            match (role, signal) {
                (Role::Broadcaster, Signal::Offer(sdp)) => (
                    room.listeners.iter().copied().collect::<Vec<_>>(),
                    ServerEvent::ReceiveOffer { stream_id, sdp },
                ),
                (Role::Broadcaster, Signal::IceCandidate(candidate)) => (
                    room.listeners.iter().copied().collect(),
                    ServerEvent::ReceiveIceCandidate {
                        stream_id,
                        from: sender,
                        candidate,
                    },
                ),
                (Role::Listener, Signal::Answer(sdp)) => (
                    room.broadcaster.into_iter().collect(),
                    ServerEvent::ReceiveAnswer {
                        stream_id,
                        from: sender,
                        sdp,
                    },
                ),
                (Role::Listener, Signal::IceCandidate(candidate)) => (
                    room.broadcaster.into_iter().collect(),
                    ServerEvent::ReceiveIceCandidate {
                        stream_id,
                        from: sender,
                        candidate,
                    },
                ),
                (Role::Listener, Signal::Offer(_)) | (Role::Broadcaster, Signal::Answer(_)) => {
                    return Err(StreamError::NotBroadcaster(stream_id));
                }
            }
        };

        if targets.is_empty() {
            tracing::debug!(stream = %stream_id, connection = %sender, signal = kind, "No peer to relay to, dropped");
            return Ok(0);
        }

        let delivered = self
            .connections
            .send_many(targets, Outbound::Event(event))
            .await;

        tracing::debug!(
            stream = %stream_id,
            connection = %sender,
            signal = kind,
            delivered = delivered,
            "Room signal relayed"
        );

        Ok(delivered)
    }

    pub async fn relay_offer(
        &self,
        stream_id: &StreamId,
        sender: ConnectionId,
        sdp: Value,
    ) -> Result<usize, StreamError> {
        self.relay(stream_id, sender, Signal::Offer(sdp)).await
    }

    pub async fn relay_answer(
        &self,
        stream_id: &StreamId,
        sender: ConnectionId,
        sdp: Value,
    ) -> Result<usize, StreamError> {
        self.relay(stream_id, sender, Signal::Answer(sdp)).await
    }

    pub async fn relay_ice_candidate(
        &self,
        stream_id: &StreamId,
        sender: ConnectionId,
        candidate: Value,
    ) -> Result<usize, StreamError> {
        self.relay(stream_id, sender, Signal::IceCandidate(candidate))
            .await
    }

    /// Remove a closed connection from its room
    ///
    /// Returns the membership it held, or `None` if it held none.
    pub async fn on_disconnect(&self, conn: ConnectionId) -> Option<Membership> {
        let mut deliveries = Vec::new();
        let membership = self.rooms.write().await.leave(conn, &mut deliveries)?;

        if membership.role == Role::Broadcaster {
            tracing::info!(
                stream = %membership.stream_id,
                connection = %conn,
                listeners = deliveries.len(),
                "Broadcaster left, stream ended"
            );
        }

        self.flush(deliveries).await;
        Some(membership)
    }

    /// Tear down a room, notifying every member including the broadcaster
    ///
    /// Returns how many members were notified.
    pub async fn end_room(&self, stream_id: &StreamId) -> usize {
        let members: Vec<ConnectionId> = {
            let mut table = self.rooms.write().await;
            let Some(mut room) = table.rooms.remove(stream_id) else {
                return 0;
            };
            room.state = RoomState::Ended;

            let members: Vec<_> = room.members().collect();
            for member in &members {
                table.memberships.remove(member);
            }
            members
        };

        tracing::info!(stream = %stream_id, members = members.len(), "Stream ended");

        let count = members.len();
        self.connections
            .send_many(
                members,
                Outbound::Event(ServerEvent::StreamEnded {
                    stream_id: stream_id.clone(),
                }),
            )
            .await;
        count
    }

    async fn flush(&self, deliveries: Vec<Delivery>) {
        for (conn, event) in deliveries {
            self.connections.send(conn, Outbound::Event(event)).await;
        }
    }

    /// Get statistics for a room
    pub async fn room_stats(&self, stream_id: &StreamId) -> Option<RoomStats> {
        self.rooms
            .read()
            .await
            .rooms
            .get(stream_id)
            .map(|room| room.stats())
    }

    /// Get the membership held by a connection
    pub async fn membership(&self, conn: ConnectionId) -> Option<Membership> {
        self.rooms.read().await.memberships.get(&conn).cloned()
    }

    /// Number of live rooms
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.rooms.len()
    }

    /// Ids of every room that currently has members
    pub async fn live_streams(&self) -> HashSet<StreamId> {
        self.rooms.read().await.rooms.keys().cloned().collect()
    }
}
