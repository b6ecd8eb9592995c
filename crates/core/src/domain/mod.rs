//! Domain entities and business rules

pub mod audio;
pub mod config;
pub mod dsp;
pub mod mixer;
pub mod pads;

// Re-export specific items to avoid ambiguous glob imports
pub use audio::{
    AudioError, FrameSink, OutputDeviceInfo, OutputEnumerator, PcmFormat, SampleWidth,
};
pub use config::*;
pub use dsp::*;
pub use mixer::{AttackGate, StreamingMixer, WetRamp};
pub use pads::{PadBank, SampleBuffer, PAD_COUNT};
