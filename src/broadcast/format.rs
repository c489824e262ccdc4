//! Canonical audio format
//!
//! Every frame pushed to subscribers is 16-bit signed little-endian PCM,
//! two interleaved channels at 44.1 kHz.

use std::time::Duration;

/// Output sample rate (Hz)
pub const SAMPLE_RATE: u32 = 44_100;

/// Output channel count
pub const CHANNELS: usize = 2;

/// Bytes per sample per channel
pub const BYTES_PER_SAMPLE: usize = 2;

/// Bytes per interleaved sample frame
pub const BLOCK_ALIGN: usize = CHANNELS * BYTES_PER_SAMPLE;

/// Playback duration of one full frame
pub const FRAME_DURATION: Duration = Duration::from_millis(100);

/// Sample frames per full frame (100 ms)
pub const FRAME_SAMPLES: usize = SAMPLE_RATE as usize / 10;

/// Bytes per full frame
pub const FRAME_BYTES: usize = FRAME_SAMPLES * BLOCK_ALIGN;

/// Delay between frame sends, slightly under `FRAME_DURATION` so clients
/// never starve
pub const PACING_INTERVAL: Duration = Duration::from_millis(90);

/// Playback duration of a PCM byte count in the canonical format
pub fn duration_of(bytes: usize) -> Duration {
    let frames = (bytes / BLOCK_ALIGN) as u64;
    Duration::from_micros(frames * 1_000_000 / SAMPLE_RATE as u64)
}

/// Convert a float sample in [-1.0, 1.0] to s16, clamping out-of-range values
#[inline]
pub fn to_i16(sample: f32) -> i16 {
    (sample * 32768.0).round().clamp(-32768.0, 32767.0) as i16
}

/// Interleave two planar channels into s16le bytes
pub fn interleave_s16le(left: &[f32], right: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(left.len().min(right.len()) * BLOCK_ALIGN);
    for (l, r) in left.iter().zip(right) {
        out.extend_from_slice(&to_i16(*l).to_le_bytes());
        out.extend_from_slice(&to_i16(*r).to_le_bytes());
    }
    out
}
