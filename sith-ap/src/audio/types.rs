//! Audio format and frame types

use std::fmt;
use std::sync::Arc;

/// Sample encoding delivered by the backend decoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleType {
    /// Signed 16-bit, little-endian byte pairs
    Int16,
    /// 32-bit float; not rendered by the output pipeline
    Float32,
}

impl SampleType {
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            SampleType::Int16 => 2,
            SampleType::Float32 => 4,
        }
    }
}

/// Format tag attached to every delivered chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AudioFormat {
    pub sample_type: SampleType,
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    /// Interleaved 16-bit PCM at the given rate and channel count
    pub fn int16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_type: SampleType::Int16,
            sample_rate,
            channels,
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:?} {}Hz {}ch",
            self.sample_type, self.sample_rate, self.channels
        )
    }
}

/// Parameters a hardware output stream is opened with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamParams {
    pub channels: u16,
    pub sample_rate: u32,
    /// Buffer length in frames (one frame = one sample per channel)
    pub buffer_frames: u32,
}

impl StreamParams {
    /// Buffer length in interleaved samples
    pub fn buffer_len(&self) -> usize {
        self.buffer_frames as usize * self.channels as usize
    }

    /// Whether a stream with these params can play `format` as-is
    pub fn matches(&self, format: &AudioFormat) -> bool {
        self.channels == format.channels && self.sample_rate == format.sample_rate
    }
}

/// One chunk of decoded audio as delivered by the backend
///
/// Consumed exactly once by the output pipeline.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub format: AudioFormat,
    pub bytes: Arc<[u8]>,
}

impl AudioFrame {
    pub fn new(format: AudioFormat, bytes: &[u8]) -> Self {
        Self {
            format,
            bytes: Arc::from(bytes),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
