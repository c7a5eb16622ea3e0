//! Inbound PCM chunk.

use std::time::Duration;

use crate::format::decode_pcm16_le;
use crate::FrameError;

/// An ordered run of mono 16-bit PCM samples at a known rate.
///
/// Chunks arrive from the network in delivery order and are appended to the
/// sample buffer as-is. There is no length bound other than the buffer's
/// free space at arrival time.
///
/// # Example
///
/// ```
/// use voice_bridge::AudioChunk;
/// use std::time::Duration;
///
/// let chunk = AudioChunk::new(vec![0i16; 2400], 24000);
/// assert_eq!(chunk.duration(), Duration::from_millis(100));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// PCM audio samples in 16-bit signed integer format.
    pub samples: Vec<i16>,

    /// Sample rate in Hz (e.g., 24000).
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Creates a new `AudioChunk`.
    pub fn new(samples: Vec<i16>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Decodes a little-endian PCM16 payload.
    pub fn from_le_bytes(bytes: &[u8], sample_rate: u32) -> Result<Self, FrameError> {
        Ok(Self::new(decode_pcm16_le(bytes)?, sample_rate))
    }

    /// Returns the duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.samples.len() as f64 / f64::from(self.sample_rate))
    }

    /// Returns the number of frames (one sample each, the stream is mono).
    pub fn frame_count(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}
