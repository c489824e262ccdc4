//! Statistics for the real-time hub

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Broadcast pipeline counters, shared with the running task
#[derive(Debug, Default)]
pub struct PipelineStats {
    frames_sent: AtomicU64,
    bytes_sent: AtomicU64,
    deliveries: AtomicU64,
    sources_played: AtomicU64,
    source_failures: AtomicU64,
}

impl PipelineStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one frame pushed to `delivered` subscribers
    pub fn record_frame(&self, bytes: usize, delivered: usize) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.deliveries.fetch_add(delivered as u64, Ordering::Relaxed);
    }

    pub fn record_source_played(&self) {
        self.sources_played.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_source_failure(&self) {
        self.source_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            sources_played: self.sources_played.load(Ordering::Relaxed),
            source_failures: self.source_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineSnapshot {
    /// Frames emitted, whether or not anyone was listening
    pub frames_sent: u64,
    pub bytes_sent: u64,
    /// Frame copies accepted by subscriber queues
    pub deliveries: u64,
    pub sources_played: u64,
    pub source_failures: u64,
}

/// Hub-wide statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct HubStats {
    /// Open transport connections
    pub connections: usize,
    /// Users with at least one connection
    pub online_users: usize,
    pub ringing_calls: usize,
    pub active_calls: usize,
    /// Live broadcast rooms
    pub rooms: usize,
    /// Reserved stream slots
    pub stream_slots: usize,
    pub audio_subscribers: usize,
    /// Frames dropped because a connection's queue was full
    pub dropped_frames: u64,
    pub pipeline: PipelineSnapshot,
}
