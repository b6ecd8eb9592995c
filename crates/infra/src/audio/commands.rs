//! Control messages for the audio engine
//!
//! Commands are produced by the control context (CLI, settings reload,
//! future hardware input) and drained by the audio callback between buffers
//! with `try_recv`. Each command is applied whole, so multi-field updates
//! like a compressor reconfiguration can never be observed half-written by
//! the audio path.

use sambox_core::domain::dsp::CompressorParams;
use sambox_core::domain::pads::SampleBuffer;

/// Message sent from the control context to the audio callback.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Publish a pre-decoded sample into a pad slot.
    ///
    /// The buffer is decoded and allocated on the loader thread; the
    /// callback only stores the shared handle.
    LoadPad { pad: usize, sample: SampleBuffer },

    /// Unload a pad slot, stopping its voice if playing.
    UnloadPad { pad: usize },

    /// Start playback of a pad.
    ///
    /// # Parameters
    /// * `pad` - Pad index (0 to 5)
    /// * `gain` - Playback gain (0.0 to 1.0)
    TriggerPad { pad: usize, gain: f32 },

    /// Stop playback of a pad (button release).
    ReleasePad { pad: usize },

    /// Stop any playing voice.
    StopAll,

    /// Set the master output gain (volume pot).
    SetMasterGain(f32),

    /// Set the static dry level and the active wet target. Applied
    /// immediately, without a ramp.
    SetMix { dry: f32, wet: f32 },

    /// Gate whether the wet signal is audible. Always ramped.
    SetEffectActive(bool),

    /// Gate whether new audio feeds the delay. Always ramped; a disabled
    /// send lets the tail ring out.
    SetSendActive(bool),

    /// Restart the attack fade (used on its own when a trigger happens
    /// outside the engine, e.g. in tests; `TriggerPad` fades implicitly).
    TriggerAttackFade,

    /// Enable or disable the master low-pass filter.
    SetLowPassEnabled(bool),

    /// Set the low-pass target cutoff in Hz (slew-limited on the way in).
    SetLowPassCutoff(f32),

    /// Set the low-pass Q. Applied immediately.
    SetLowPassQ(f32),

    /// Set the cutoff slew rate in Hz per second.
    SetCutoffSlewRate(f32),

    /// Set the delay time in milliseconds.
    SetDelayTimeMs(f32),

    /// Set the delay depth (wet contribution within the effect).
    SetDelayDepth(f32),

    /// Set the delay feedback ratio (clamped below unity).
    SetDelayFeedback(f32),

    /// Replace the compressor parameters wholesale.
    SetCompressor(CompressorParams),

    /// Enable or disable the compressor. Disabled is a transparent bypass
    /// with frozen envelope state.
    SetCompressorEnabled(bool),
}
