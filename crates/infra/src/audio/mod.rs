//! Audio backend built on CPAL
//!
//! CPAL abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod commands;
pub mod cpal_backend;
pub mod engine;
pub mod scope;

pub use commands::EngineCommand;
pub use cpal_backend::CpalEnumerator;
pub use engine::AudioEngine;
pub use scope::{scope_channel, ScopeReader, ScopeTap};
