//! Frames queued for delivery to a single connection

use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TryRecvError};

use crate::protocol::ServerEvent;

/// A frame waiting in a connection's outbound queue
///
/// Cheap to clone: audio payloads are reference counted `Bytes`, so fanning
/// one frame out to many connections shares a single allocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    /// A JSON signaling or notification event
    Event(ServerEvent),
    /// A canonical PCM audio frame from the broadcast pipeline
    Audio(Bytes),
}

impl Outbound {
    /// Get the event, if this is an event frame
    pub fn as_event(&self) -> Option<&ServerEvent> {
        match self {
            Outbound::Event(event) => Some(event),
            Outbound::Audio(_) => None,
        }
    }

    /// Get the audio payload, if this is an audio frame
    pub fn as_audio(&self) -> Option<&Bytes> {
        match self {
            Outbound::Audio(data) => Some(data),
            Outbound::Event(_) => None,
        }
    }
}

impl From<ServerEvent> for Outbound {
    fn from(event: ServerEvent) -> Self {
        Outbound::Event(event)
    }
}

/// Receiving side of a connection's outbound queues
///
/// Events and audio are queued separately so a backlog of audio never
/// crowds out signaling. Pending events are always yielded first.
#[derive(Debug)]
pub struct OutboundReceiver {
    events: mpsc::Receiver<ServerEvent>,
    audio: mpsc::Receiver<Bytes>,
}

impl OutboundReceiver {
    pub(super) fn new(events: mpsc::Receiver<ServerEvent>, audio: mpsc::Receiver<Bytes>) -> Self {
        Self { events, audio }
    }

    /// Wait for the next frame; `None` once the connection is closed
    pub async fn recv(&mut self) -> Option<Outbound> {
        tokio::select! {
            biased;
            Some(event) = self.events.recv() => Some(Outbound::Event(event)),
            Some(pcm) = self.audio.recv() => Some(Outbound::Audio(pcm)),
            else => None,
        }
    }

    /// Take the next frame without waiting
    pub fn try_recv(&mut self) -> Result<Outbound, TryRecvError> {
        if let Ok(event) = self.events.try_recv() {
            return Ok(Outbound::Event(event));
        }
        self.audio.try_recv().map(Outbound::Audio)
    }
}
