//! Stream slots
//!
//! A slot reserves a stream id for a user before any connection joins the
//! room. Only the owner can end it or broadcast in it. A slot goes away when
//! its stream ends, or after a grace period if no room was ever live.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio::time::{Duration, Instant};

use super::error::StreamError;
use super::room::StreamId;
use crate::connection::UserId;

/// A reserved live stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamSlot {
    pub stream_id: StreamId,
    pub owner_user_id: UserId,
    pub created_at: DateTime<Utc>,
}

struct SlotEntry {
    slot: StreamSlot,
    reserved_at: Instant,
}

/// Registry of reserved stream ids
#[derive(Default)]
pub struct StreamSlots {
    slots: RwLock<HashMap<StreamId, SlotEntry>>,
}

impl StreamSlots {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a fresh stream id for `owner`
    pub async fn create(&self, owner: &UserId) -> StreamSlot {
        let slot = StreamSlot {
            stream_id: StreamId::generate(),
            owner_user_id: owner.clone(),
            created_at: Utc::now(),
        };

        self.slots.write().await.insert(
            slot.stream_id.clone(),
            SlotEntry {
                slot: slot.clone(),
                reserved_at: Instant::now(),
            },
        );

        tracing::info!(stream = %slot.stream_id, user = %owner, "Stream slot created");
        slot
    }

    /// Release a slot on behalf of its owner
    pub async fn end(&self, stream_id: &StreamId, user: &UserId) -> Result<StreamSlot, StreamError> {
        let mut slots = self.slots.write().await;

        match slots.get(stream_id) {
            None => Err(StreamError::UnknownStream(stream_id.clone())),
            Some(entry) if entry.slot.owner_user_id != *user => {
                tracing::warn!(stream = %stream_id, user = %user, owner = %entry.slot.owner_user_id, "Stream end by non-owner");
                Err(StreamError::NotOwner(stream_id.clone()))
            }
            Some(_) => slots
                .remove(stream_id)
                .map(|entry| entry.slot)
                .ok_or_else(|| StreamError::UnknownStream(stream_id.clone())),
        }
    }

    /// Check that `user` may broadcast on `stream_id`
    ///
    /// Stream ids without a slot are open to anyone.
    pub async fn check_broadcaster(&self, stream_id: &StreamId, user: &UserId) -> Result<(), StreamError> {
        match self.slots.read().await.get(stream_id) {
            Some(entry) if entry.slot.owner_user_id != *user => {
                tracing::warn!(stream = %stream_id, user = %user, owner = %entry.slot.owner_user_id, "Broadcast by non-owner");
                Err(StreamError::NotOwner(stream_id.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Drop the slot of a stream that has ended
    pub async fn release(&self, stream_id: &StreamId) -> Option<StreamSlot> {
        let slot = self.slots.write().await.remove(stream_id)?.slot;
        tracing::debug!(stream = %stream_id, "Stream slot released");
        Some(slot)
    }

    /// Drop slots older than `ttl` whose stream is not in `live`
    ///
    /// Returns how many were reclaimed.
    pub async fn reclaim(&self, ttl: Duration, live: &HashSet<StreamId>) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().await;
        let before = slots.len();

        slots.retain(|stream_id, entry| {
            live.contains(stream_id) || now.duration_since(entry.reserved_at) <= ttl
        });
        before - slots.len()
    }

    pub async fn get(&self, stream_id: &StreamId) -> Option<StreamSlot> {
        self.slots
            .read()
            .await
            .get(stream_id)
            .map(|entry| entry.slot.clone())
    }

    pub async fn len(&self) -> usize {
        self.slots.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.slots.read().await.is_empty()
    }
}
