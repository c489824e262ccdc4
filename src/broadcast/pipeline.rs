//! The paced audio broadcast task
//!
//! One long-running task cycles through the playlist. Each source is decoded
//! on a blocking thread, cut into 100 ms frames and pushed to every audio
//! subscriber with a pause slightly shorter than the frame between sends.
//!
//! ```text
//!   Playlist ──► PcmDecoder (blocking thread) ──mpsc──► Framer ──► pacer
//!                                                                    │
//!                                  ConnectionTable::send_many ◄──────┘
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::config::BroadcastConfig;
use super::decode::{DecodeError, PcmDecoder};
use super::framer::Framer;
use super::playlist::Playlist;
use super::subscribers::SubscriberSet;
use crate::connection::{ConnectionTable, Outbound};
use crate::stats::PipelineStats;

type Chunk = Result<Vec<u8>, DecodeError>;

/// How playing one source ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Playback {
    Finished { frames: u64 },
    Cancelled,
}

/// Paced broadcast of a playlist directory to audio subscribers
pub struct BroadcastPipeline {
    config: BroadcastConfig,
    subscribers: Arc<SubscriberSet>,
    connections: Arc<ConnectionTable>,
    stats: Arc<PipelineStats>,
}

impl BroadcastPipeline {
    pub fn new(
        config: BroadcastConfig,
        subscribers: Arc<SubscriberSet>,
        connections: Arc<ConnectionTable>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            config,
            subscribers,
            connections,
            stats,
        }
    }

    pub fn config(&self) -> &BroadcastConfig {
        &self.config
    }

    /// Run the pipeline on its own task until `shutdown` is cancelled
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(shutdown).await })
    }

    /// Run until `shutdown` is cancelled
    ///
    /// Returns within one pacing interval of cancellation.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut playlist = Playlist::new(&self.config.playlist_dir, &self.config.extensions);

        tracing::info!(dir = %playlist.dir().display(), "Broadcast pipeline started");

        while !shutdown.is_cancelled() {
            let source = match playlist.next_source().await {
                Ok(Some(source)) => source,
                Ok(None) => {
                    tracing::debug!("Playlist empty, waiting");
                    if !pause(&shutdown, self.config.empty_playlist_backoff).await {
                        break;
                    }
                    continue;
                }
                Err(e) => {
                    tracing::warn!(dir = %playlist.dir().display(), error = %e, "Playlist scan failed");
                    if !pause(&shutdown, self.config.error_backoff).await {
                        break;
                    }
                    continue;
                }
            };

            match self.play(&source, &shutdown).await {
                Ok(Playback::Finished { frames }) => {
                    self.stats.record_source_played();
                    tracing::info!(source = %source.display(), frames = frames, "Source finished");
                }
                Ok(Playback::Cancelled) => break,
                Err(e) => {
                    self.stats.record_source_failure();
                    tracing::warn!(source = %source.display(), error = %e, "Source failed, skipping");
                    if !pause(&shutdown, self.config.error_backoff).await {
                        break;
                    }
                }
            }
        }

        tracing::info!("Broadcast pipeline stopped");
    }

    /// Decode one source and emit its frames
    async fn play(&self, source: &Path, shutdown: &CancellationToken) -> Result<Playback, DecodeError> {
        let (tx, mut rx) = mpsc::channel(self.config.decode_queue_depth.max(1));
        let path = source.to_path_buf();
        // Detached: dropping `rx` makes the decoder thread stop at its next send
        let _decoder = tokio::task::spawn_blocking(move || decode_source(path, tx));

        tracing::debug!(source = %source.display(), "Source started");

        let mut framer = Framer::new();
        let mut frames = 0u64;

        loop {
            let chunk = tokio::select! {
                _ = shutdown.cancelled() => return Ok(Playback::Cancelled),
                chunk = rx.recv() => chunk,
            };

            match chunk {
                Some(Ok(pcm)) => {
                    for frame in framer.push(&pcm) {
                        if !self.emit(frame, shutdown).await {
                            return Ok(Playback::Cancelled);
                        }
                        frames += 1;
                    }
                }
                Some(Err(e)) => return Err(e),
                None => {
                    if let Some(tail) = framer.finish() {
                        if !self.emit(tail, shutdown).await {
                            return Ok(Playback::Cancelled);
                        }
                        frames += 1;
                    }
                    return Ok(Playback::Finished { frames });
                }
            }
        }
    }

    /// Push one frame to the current subscribers, then wait out the pacing
    /// interval. Returns false if shutdown was requested meanwhile.
    async fn emit(&self, frame: Bytes, shutdown: &CancellationToken) -> bool {
        let subscribers = self.subscribers.snapshot().await;
        let len = frame.len();

        let delivered = if subscribers.is_empty() {
            0
        } else {
            self.connections
                .send_many(subscribers, Outbound::Audio(frame))
                .await
        };
        self.stats.record_frame(len, delivered);

        pause(shutdown, self.config.pacing_interval).await
    }
}

/// Sleep unless cancelled first; returns false on cancellation
async fn pause(shutdown: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Blocking decode loop feeding the pacer
fn decode_source(path: PathBuf, tx: mpsc::Sender<Chunk>) {
    let mut decoder = match PcmDecoder::open(&path) {
        Ok(decoder) => decoder,
        Err(e) => {
            let _ = tx.blocking_send(Err(e));
            return;
        }
    };

    loop {
        match decoder.next_chunk() {
            Ok(Some(pcm)) => {
                if tx.blocking_send(Ok(pcm)).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                let _ = tx.blocking_send(Err(e));
                return;
            }
        }
    }
}
