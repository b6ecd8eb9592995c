//! Sample pads and voice playback
//!
//! Six pads hold pre-decoded samples; pressing a pad starts playback from
//! the beginning and releasing it stops the voice. There is a single voice:
//! a new trigger steals whatever was playing, which is also why every
//! trigger is paired with an attack fade in the mixer.

use std::sync::Arc;

use crate::domain::audio::SampleWidth;
use tracing::{debug, warn};

/// Number of sample pads.
pub const PAD_COUNT: usize = 6;

/// Pre-decoded, immutable sample data shared between the loader thread and
/// the audio context.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    pub channels: u16,
    /// Interleaved signed 16-bit samples.
    pub samples: Arc<[i16]>,
}

impl SampleBuffer {
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.samples.len() / self.channels as usize
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ActiveVoice {
    pad: usize,
    frame_pos: usize,
    gain: f32,
}

/// Pad bank with a single playback voice.
///
/// `render` runs in the audio context; everything else is called from the
/// control context via the engine's command channel.
pub struct PadBank {
    channels: u16,
    width: SampleWidth,
    master_gain: f32,
    slots: [Option<SampleBuffer>; PAD_COUNT],
    voice: Option<ActiveVoice>,
}

impl PadBank {
    pub fn new(channels: u16, width: SampleWidth) -> Self {
        Self {
            channels,
            width,
            master_gain: 1.0,
            slots: std::array::from_fn(|_| None),
            voice: None,
        }
    }

    /// Adopt a new stream layout, dropping any in-flight voice.
    pub fn configure(&mut self, channels: u16, width: SampleWidth) {
        self.channels = channels;
        self.width = width;
        self.voice = None;
    }

    /// Load a sample into a pad slot. Samples with a channel layout that
    /// does not match the stream are rejected.
    pub fn load(&mut self, pad: usize, sample: SampleBuffer) -> bool {
        if pad >= PAD_COUNT {
            return false;
        }
        if sample.channels != self.channels {
            warn!(
                pad,
                sample_channels = sample.channels,
                stream_channels = self.channels,
                "Rejecting sample with mismatched channel count"
            );
            return false;
        }
        debug!(pad, frames = sample.frame_count(), "Sample loaded");
        self.slots[pad] = Some(sample);
        true
    }

    pub fn unload(&mut self, pad: usize) {
        if pad >= PAD_COUNT {
            return;
        }
        if self
            .voice
            .map(|voice| voice.pad == pad)
            .unwrap_or(false)
        {
            self.voice = None;
        }
        self.slots[pad] = None;
    }

    /// Start playback of a pad from frame zero. Returns whether a voice
    /// actually started; the caller pairs a successful trigger with an
    /// attack fade.
    pub fn trigger(&mut self, pad: usize, gain: f32) -> bool {
        if pad >= PAD_COUNT || self.slots[pad].is_none() {
            return false;
        }
        if !gain.is_finite() || !(0.0..=1.0).contains(&gain) {
            return false;
        }
        self.voice = Some(ActiveVoice {
            pad,
            frame_pos: 0,
            gain,
        });
        true
    }

    /// Stop the voice if it is playing the given pad.
    pub fn release(&mut self, pad: usize) {
        if self
            .voice
            .map(|voice| voice.pad == pad)
            .unwrap_or(false)
        {
            self.voice = None;
        }
    }

    pub fn stop_all(&mut self) {
        self.voice = None;
    }

    pub fn is_idle(&self) -> bool {
        self.voice.is_none()
    }

    pub fn set_master_gain(&mut self, gain: f32) {
        if gain.is_finite() {
            self.master_gain = gain.clamp(0.0, 1.0);
        }
    }

    pub fn master_gain(&self) -> f32 {
        self.master_gain
    }

    /// Render up to `frames` frames of the active voice as interleaved
    /// bytes in the stream width, appending to `out`. Returns the number of
    /// frames rendered; fewer than requested means the sample ended and the
    /// voice stopped.
    pub fn render(&mut self, frames: usize, out: &mut Vec<u8>) -> usize {
        let Some(mut voice) = self.voice else {
            return 0;
        };
        let Some(sample) = self.slots[voice.pad].as_ref() else {
            self.voice = None;
            return 0;
        };

        let channels = self.channels as usize;
        let total_frames = sample.frame_count();
        let available = total_frames.saturating_sub(voice.frame_pos);
        let to_render = frames.min(available);
        let gain = voice.gain * self.master_gain;

        for frame in 0..to_render {
            let base = (voice.frame_pos + frame) * channels;
            for ch in 0..channels {
                let value = (sample.samples[base + ch] as f32 * gain)
                    .clamp(i16::MIN as f32, i16::MAX as f32) as i16;
                match self.width {
                    SampleWidth::I16 => out.extend_from_slice(&value.to_ne_bytes()),
                    SampleWidth::I32 => {
                        out.extend_from_slice(&(((value as i32) << 16).to_ne_bytes()))
                    }
                }
            }
        }

        voice.frame_pos += to_render;
        if voice.frame_pos >= total_frames {
            debug!(pad = voice.pad, "Sample playback finished");
            self.voice = None;
        } else {
            self.voice = Some(voice);
        }

        to_render
    }
}
