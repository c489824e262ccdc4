//! Ambient audio broadcast
//!
//! A single background task plays a directory of audio files in a loop and
//! pushes canonical PCM frames to every subscribed connection. Subscribing
//! is independent of stream rooms.

pub mod config;
pub mod decode;
pub mod format;
pub mod framer;
pub mod pipeline;
pub mod playlist;
pub mod subscribers;

pub use config::BroadcastConfig;
pub use decode::{DecodeError, PcmDecoder};
pub use framer::Framer;
pub use pipeline::BroadcastPipeline;
pub use playlist::Playlist;
pub use subscribers::SubscriberSet;
