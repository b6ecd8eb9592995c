//! PCM stream model and audio device abstractions
//!
//! This module defines the platform-agnostic audio interfaces. The cpal
//! implementation lives in the `infra` crate.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur in the audio subsystem
#[derive(Debug, Error)]
pub enum AudioError {
    /// Requested audio device was not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// Error in audio stream creation or processing
    #[error("Stream error: {0}")]
    StreamError(String),

    /// Invalid configuration for audio device
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Input/Output error at the OS level
    #[error("OS error: {0}")]
    OsError(String),

    /// Device does not support the requested configuration
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),
}

pub type Result<T> = std::result::Result<T, AudioError>;

/// Width of one signed PCM sample on the stream path.
///
/// Anything other than 16- or 32-bit signed PCM puts the mixer into its
/// degraded dry-passthrough mode instead of failing the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SampleWidth {
    I16,
    I32,
}

impl SampleWidth {
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            16 => Some(SampleWidth::I16),
            32 => Some(SampleWidth::I32),
            _ => None,
        }
    }

    pub fn bytes(self) -> usize {
        match self {
            SampleWidth::I16 => 2,
            SampleWidth::I32 => 4,
        }
    }
}

/// Format of an interleaved PCM stream.
///
/// The format is fixed for the lifetime of a streaming session; changing it
/// goes through [`StreamingMixer::configure`](crate::domain::mixer::StreamingMixer::configure),
/// which resets all derived state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Sample width of the stream, `None` when the bit depth is unsupported.
    pub fn width(&self) -> Option<SampleWidth> {
        SampleWidth::from_bits(self.bits_per_sample)
    }

    /// Size in bytes of one frame (one sample per channel).
    pub fn frame_bytes(&self) -> usize {
        (self.bits_per_sample as usize / 8) * self.channels as usize
    }

    /// A format with zero channels or a zero sample rate cannot stream.
    pub fn is_streamable(&self) -> bool {
        self.sample_rate > 0 && self.channels > 0
    }

    /// Number of frames covered by `ms` milliseconds, at least one.
    pub fn frames_for_ms(&self, ms: u32) -> u32 {
        ((self.sample_rate as u64 * ms as u64) / 1000).max(1) as u32
    }
}

impl Default for PcmFormat {
    fn default() -> Self {
        Self {
            sample_rate: 44_100,
            channels: 2,
            bits_per_sample: 16,
        }
    }
}

/// Downstream sink for mixed PCM frames.
///
/// The mixer borrows the sink for the duration of a single `write` call and
/// hands back whole frames in the configured stream format. Returns the
/// number of bytes accepted.
pub trait FrameSink {
    fn write(&mut self, bytes: &[u8]) -> usize;
}

impl FrameSink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) -> usize {
        self.extend_from_slice(bytes);
        bytes.len()
    }
}

/// Information about an audio output device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputDeviceInfo {
    pub name: String,
    pub sample_rates: Vec<u32>,
    pub channel_counts: Vec<u16>,
    pub default_sample_rate: Option<u32>,
}

/// Trait for enumerating available audio output devices
pub trait OutputEnumerator: Send + Sync {
    /// List all available output devices
    fn output_devices(&self) -> Result<Vec<OutputDeviceInfo>>;

    /// Get the default output device
    fn default_output_device(&self) -> Result<OutputDeviceInfo>;

    /// Find an output device by name
    fn device_by_name(&self, name: &str) -> Result<OutputDeviceInfo>;
}
