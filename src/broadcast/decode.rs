//! Source decoding into the canonical format
//!
//! [`PcmDecoder`] is a blocking, incremental decoder: each call to
//! [`PcmDecoder::next_chunk`] reads packets until it has some canonical PCM
//! to hand back. It is meant to run on a blocking thread.

use std::fs::File;
use std::path::{Path, PathBuf};

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

use super::format::{interleave_s16le, SAMPLE_RATE};

/// Input frames consumed per resampler call
const RESAMPLE_CHUNK: usize = 1024;

/// Error type for source decoding
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("failed to open {}: {}", .path.display(), .source)]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("unsupported source: {0}")]
    Unsupported(String),
    #[error("decode failed: {0}")]
    Symphonia(#[from] SymphoniaError),
    #[error("resample failed: {0}")]
    Resample(String),
}

/// Incremental decoder producing canonical s16le stereo PCM
pub struct PcmDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    source_rate: u32,
    resampler: Option<StreamResampler>,
    finished: bool,
}

impl PcmDecoder {
    /// Open and probe a source file
    pub fn open(path: &Path) -> Result<Self, DecodeError> {
        let file = File::open(path).map_err(|source| DecodeError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| DecodeError::Unsupported("no audio track".into()))?;

        let track_id = track.id;
        let source_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| DecodeError::Unsupported("unknown sample rate".into()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())?;

        let resampler = if source_rate != SAMPLE_RATE {
            Some(StreamResampler::new(source_rate)?)
        } else {
            None
        };

        tracing::debug!(
            source = %path.display(),
            sample_rate = source_rate,
            resampling = resampler.is_some(),
            "Source opened"
        );

        Ok(Self {
            format,
            decoder,
            track_id,
            source_rate,
            resampler,
            finished: false,
        })
    }

    /// Sample rate of the source before resampling
    pub fn source_rate(&self) -> u32 {
        self.source_rate
    }

    /// Decode the next piece of canonical PCM
    ///
    /// Returns `Ok(None)` once the source is exhausted.
    pub fn next_chunk(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    self.finished = true;
                    return self.drain_resampler();
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                // Corrupt packet, the stream itself is still usable
                Err(SymphoniaError::DecodeError(msg)) => {
                    tracing::debug!(error = msg, "Skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            if decoded.frames() == 0 || channels == 0 {
                continue;
            }

            let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
            sample_buf.copy_interleaved_ref(decoded);

            let (left, right) = split_stereo(sample_buf.samples(), channels);
            let (left, right) = match self.resampler.as_mut() {
                Some(resampler) => resampler.process(&left, &right)?,
                None => (left, right),
            };

            if !left.is_empty() {
                return Ok(Some(interleave_s16le(&left, &right)));
            }
        }
    }

    fn drain_resampler(&mut self) -> Result<Option<Vec<u8>>, DecodeError> {
        let Some(resampler) = self.resampler.as_mut() else {
            return Ok(None);
        };

        let (left, right) = resampler.finish()?;
        if left.is_empty() {
            Ok(None)
        } else {
            Ok(Some(interleave_s16le(&left, &right)))
        }
    }
}

/// Map interleaved samples to two planar channels
///
/// Mono is duplicated to both sides; anything above two channels keeps the
/// first two.
fn split_stereo(samples: &[f32], channels: usize) -> (Vec<f32>, Vec<f32>) {
    let frames = samples.len() / channels;
    let mut left = Vec::with_capacity(frames);
    let mut right = Vec::with_capacity(frames);

    for frame in samples.chunks_exact(channels) {
        left.push(frame[0]);
        right.push(if channels > 1 { frame[1] } else { frame[0] });
    }

    (left, right)
}

/// Streaming stereo resampler to the canonical rate
///
/// Compensates the filter delay so the total output length is
/// `round(input_frames * SAMPLE_RATE / source_rate)`.
struct StreamResampler {
    inner: SincFixedIn<f32>,
    pending: [Vec<f32>; 2],
    ratio: f64,
    /// Leading output frames still to discard
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl StreamResampler {
    fn new(source_rate: u32) -> Result<Self, DecodeError> {
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 256,
            window: WindowFunction::BlackmanHarris2,
        };

        let ratio = f64::from(SAMPLE_RATE) / f64::from(source_rate);
        let inner = SincFixedIn::<f32>::new(ratio, 2.0, params, RESAMPLE_CHUNK, 2)
            .map_err(|e| DecodeError::Resample(format!("init: {e}")))?;
        let delay = inner.output_delay();

        Ok(Self {
            inner,
            pending: [Vec::new(), Vec::new()],
            ratio,
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    fn process(&mut self, left: &[f32], right: &[f32]) -> Result<(Vec<f32>, Vec<f32>), DecodeError> {
        self.pending[0].extend_from_slice(left);
        self.pending[1].extend_from_slice(right);
        self.frames_in += left.len() as u64;

        let mut out = (Vec::new(), Vec::new());
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }

            let input: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| channel.drain(..needed).collect())
                .collect();
            self.run(&input, u64::MAX, &mut out)?;
        }

        Ok(out)
    }

    /// Flush the filter with silence and trim to the exact output length
    fn finish(&mut self) -> Result<(Vec<f32>, Vec<f32>), DecodeError> {
        let expected = (self.frames_in as f64 * self.ratio).round() as u64;
        let mut out = (Vec::new(), Vec::new());

        while self.frames_out < expected {
            let needed = self.inner.input_frames_next();
            let input: Vec<Vec<f32>> = self
                .pending
                .iter_mut()
                .map(|channel| {
                    let mut chunk = std::mem::take(channel);
                    chunk.resize(needed, 0.0);
                    chunk
                })
                .collect();

            if self.run(&input, expected, &mut out)? == 0 && self.delay == 0 {
                break;
            }
        }

        Ok(out)
    }

    /// Resample one chunk, dropping delay frames and stopping at `limit`
    fn run(
        &mut self,
        input: &[Vec<f32>],
        limit: u64,
        out: &mut (Vec<f32>, Vec<f32>),
    ) -> Result<usize, DecodeError> {
        let resampled = self
            .inner
            .process(input, None)
            .map_err(|e| DecodeError::Resample(format!("process: {e}")))?;

        let produced = resampled.first().map_or(0, |c| c.len());
        let skip = self.delay.min(produced);
        self.delay -= skip;

        let room = limit.saturating_sub(self.frames_out) as usize;
        let keep = (produced - skip).min(room);

        if let [left, right, ..] = resampled.as_slice() {
            out.0.extend_from_slice(&left[skip..skip + keep]);
            out.1.extend_from_slice(&right[skip..skip + keep]);
        }
        self.frames_out += keep as u64;

        Ok(keep)
    }
}

/// Build a 16-bit PCM WAV file in memory
///
/// Left channel carries a ramp, further channels carry its negation.
#[cfg(test)]
pub(crate) fn test_wav(sample_rate: u32, channels: u16, frames: u32) -> Vec<u8> {
    let block_align = channels * 2;
    let byte_rate = sample_rate * u32::from(block_align);
    let data_size = frames * u32::from(block_align);

    let mut buf = Vec::with_capacity(44 + data_size as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_size).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes());
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());

    for i in 0..frames {
        let sample = ((i % 200) as i16 - 100) * 100;
        for ch in 0..channels {
            let value = if ch == 0 { sample } else { -sample };
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
    buf
}
