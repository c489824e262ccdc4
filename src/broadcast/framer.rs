//! Cuts a PCM byte stream into fixed-size frames

use bytes::{Bytes, BytesMut};

use super::format::FRAME_BYTES;

/// Accumulates PCM and yields full frames
///
/// The trailing remainder of a source is returned by [`Framer::finish`]
/// as-is, never padded with silence.
#[derive(Debug)]
pub struct Framer {
    buf: BytesMut,
    frame_size: usize,
}

impl Framer {
    pub fn new() -> Self {
        Self::with_frame_size(FRAME_BYTES)
    }

    pub fn with_frame_size(frame_size: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(frame_size * 2),
            frame_size: frame_size.max(1),
        }
    }

    /// Append PCM and take every complete frame
    pub fn push(&mut self, pcm: &[u8]) -> Vec<Bytes> {
        self.buf.extend_from_slice(pcm);

        let mut frames = Vec::with_capacity(self.buf.len() / self.frame_size);
        while self.buf.len() >= self.frame_size {
            frames.push(self.buf.split_to(self.frame_size).freeze());
        }
        frames
    }

    /// Take the short trailing frame, if any
    pub fn finish(&mut self) -> Option<Bytes> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.buf.split().freeze())
    }

    /// Bytes buffered but not yet framed
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frames_across_pushes() {
        let mut framer = Framer::with_frame_size(4);

        assert!(framer.push(&[1, 2, 3]).is_empty());
        let frames = framer.push(&[4, 5, 6, 7, 8, 9]);

        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref(), &[1, 2, 3, 4]);
        assert_eq!(frames[1].as_ref(), &[5, 6, 7, 8]);
        assert_eq!(framer.pending(), 1);
    }

    #[test]
    fn test_tail_is_trimmed_not_padded() {
        let mut framer = Framer::new();

        let frames = framer.push(&vec![0u8; FRAME_BYTES + 100]);
        assert_eq!(frames.len(), 1);

        let tail = framer.finish().unwrap();
        assert_eq!(tail.len(), 100);
        assert!(framer.finish().is_none());
    }
}
