//! Broadcast pipeline configuration

use std::path::PathBuf;
use std::time::Duration;

use super::format::PACING_INTERVAL;

/// Configuration for the ambient audio broadcast
#[derive(Debug, Clone)]
pub struct BroadcastConfig {
    /// Directory holding the playlist
    pub playlist_dir: PathBuf,

    /// Accepted file extensions, matched case-insensitively
    pub extensions: Vec<String>,

    /// Delay between consecutive frames
    pub pacing_interval: Duration,

    /// Wait before listing an empty playlist again
    pub empty_playlist_backoff: Duration,

    /// Wait after a source fails before moving on
    pub error_backoff: Duration,

    /// Decoded chunks buffered between the decoder thread and the pacer
    pub decode_queue_depth: usize,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            playlist_dir: PathBuf::from("playlist"),
            extensions: ["mp3", "wav", "flac", "ogg", "m4a", "aac"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            pacing_interval: PACING_INTERVAL,
            empty_playlist_backoff: Duration::from_secs(5),
            error_backoff: Duration::from_secs(1),
            decode_queue_depth: 8,
        }
    }
}

impl BroadcastConfig {
    /// Create a config for a playlist directory
    pub fn with_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            playlist_dir: dir.into(),
            ..Default::default()
        }
    }

    /// Set accepted extensions
    pub fn extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Set the frame pacing interval
    pub fn pacing_interval(mut self, interval: Duration) -> Self {
        self.pacing_interval = interval;
        self
    }

    /// Set the empty playlist backoff
    pub fn empty_playlist_backoff(mut self, backoff: Duration) -> Self {
        self.empty_playlist_backoff = backoff;
        self
    }

    /// Set the source error backoff
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Set the decoder queue depth
    pub fn decode_queue_depth(mut self, depth: usize) -> Self {
        self.decode_queue_depth = depth.max(1);
        self
    }
}
