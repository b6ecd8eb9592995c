//! Sambox infrastructure: platform adapters around the core domain.
//!
//! - [`audio`]: cpal device enumeration, the output stream and its real-time
//!   callback, the control command channel, and the scope waveform tap
//! - [`sample`]: decoding WAV files into pad sample buffers

pub mod audio;
pub mod sample;
