//! Audio engine: output stream construction and the real-time callback
//!
//! The callback closure owns the mixer, the pad bank, the command receiver,
//! and the scope tap. State is carried by the closure itself rather than
//! any global, so multiple engines can coexist and nothing outlives the
//! stream. Per callback it drains pending control commands, renders the
//! active voice (or pumps silence so effect tails ring out), runs the
//! mixer, and converts the mixed PCM into the device's f32 buffer.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{BufferSize, Stream, StreamConfig};
use crossbeam::channel::{bounded, Sender, TrySendError};
use tracing::{debug, error, info};

use sambox_core::domain::audio::{AudioError, FrameSink, PcmFormat, Result, SampleWidth};
use sambox_core::domain::config::SamboxConfig;
use sambox_core::domain::mixer::StreamingMixer;
use sambox_core::domain::pads::PadBank;

use crate::audio::commands::EngineCommand;
use crate::audio::scope::{scope_channel, ScopeReader};

const COMMAND_QUEUE_CAPACITY: usize = 256;
const SCOPE_CAPACITY: usize = 4_096;
const SCOPE_DOWNSAMPLE: usize = 16;
const SCOPE_GAMMA: f32 = 0.5;

/// Handle to a running audio engine.
///
/// Dropping it stops the stream.
pub struct AudioEngine {
    _stream: Stream,
    commands: Sender<EngineCommand>,
    sample_rate: u32,
    channels: u16,
}

impl AudioEngine {
    /// Open the default output device and start the stream.
    ///
    /// Returns the engine handle and the scope reader for the display task.
    pub fn start(config: &SamboxConfig) -> Result<(AudioEngine, ScopeReader)> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AudioError::DeviceNotFound("No default output device".to_string()))?;
        let device_config = device
            .default_output_config()
            .map_err(|e| AudioError::InvalidConfiguration(e.to_string()))?;
        let sample_rate = device_config.sample_rate();
        let channels = device_config.channels();

        info!(sample_rate, channels, "Starting audio engine");

        // The internal path is 16-bit; the device buffer is f32 either way.
        let format = PcmFormat::new(sample_rate, channels, 16);
        let width = format.width().unwrap_or(SampleWidth::I16);

        let mut mixer = StreamingMixer::new();
        let mut pads = PadBank::new(channels, width);
        for command in settings_commands(config) {
            apply_command(&mut mixer, &mut pads, command);
        }
        mixer.configure(format);

        let (command_tx, command_rx) = bounded(COMMAND_QUEUE_CAPACITY);
        let (mut scope_tap, scope_reader) =
            scope_channel(SCOPE_CAPACITY, SCOPE_DOWNSAMPLE, SCOPE_GAMMA);

        let stream_config = StreamConfig {
            channels,
            sample_rate,
            buffer_size: BufferSize::Fixed(config.stream.buffer_size),
        };

        // Reused every callback; capacity never grows past one device buffer
        let mut render_buf: Vec<u8> =
            Vec::with_capacity(config.stream.buffer_size as usize * format.frame_bytes());

        let stream = device
            .build_output_stream(
                &stream_config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    while let Ok(command) = command_rx.try_recv() {
                        apply_command(&mut mixer, &mut pads, command);
                    }

                    let frames = data.len() / channels as usize;
                    {
                        let mut sink = DeviceSink::new(data, width);

                        render_buf.clear();
                        let rendered = pads.render(frames, &mut render_buf);
                        if rendered > 0 {
                            mixer.write(&mut sink, &render_buf);
                        }
                        if rendered < frames {
                            // Idle or the sample just ended: zero input keeps
                            // the delay and filter tails evolving
                            mixer.pump_silence(&mut sink, frames - rendered);
                        }
                        sink.finish();
                    }

                    scope_tap.capture(data, channels as usize);
                },
                |err| {
                    error!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamError(format!("Failed to build stream: {}", e)))?;

        stream
            .play()
            .map_err(|e| AudioError::StreamError(format!("Failed to start stream: {}", e)))?;

        Ok((
            AudioEngine {
                _stream: stream,
                commands: command_tx,
                sample_rate,
                channels,
            },
            scope_reader,
        ))
    }

    /// Send a command to the audio callback. Non-blocking; fails when the
    /// queue is full rather than stalling the control context.
    pub fn command(&self, command: EngineCommand) -> Result<()> {
        self.commands.try_send(command).map_err(|e| match e {
            TrySendError::Full(_) => AudioError::StreamError("Command queue full".to_string()),
            TrySendError::Disconnected(_) => {
                AudioError::StreamError("Audio stream is gone".to_string())
            }
        })
    }

    /// Re-apply every tunable from a (re)loaded configuration.
    pub fn apply_settings(&self, config: &SamboxConfig) -> Result<()> {
        debug!("Applying settings to running engine");
        for command in settings_commands(config) {
            self.command(command)?;
        }
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }
}

/// Commands equivalent to the tunable parameters of a configuration.
fn settings_commands(config: &SamboxConfig) -> Vec<EngineCommand> {
    vec![
        EngineCommand::SetMix {
            dry: config.mix.dry_level,
            wet: config.mix.wet_level,
        },
        EngineCommand::SetDelayTimeMs(config.delay.time_ms),
        EngineCommand::SetDelayDepth(config.delay.depth),
        EngineCommand::SetDelayFeedback(config.delay.feedback),
        EngineCommand::SetLowPassEnabled(config.filter.enabled),
        EngineCommand::SetLowPassCutoff(config.filter.cutoff_hz),
        EngineCommand::SetLowPassQ(config.filter.q),
        EngineCommand::SetCutoffSlewRate(config.filter.slew_hz_per_sec),
        EngineCommand::SetCompressor(config.compressor.to_params()),
    ]
}

/// Apply one control command to the audio-side state.
fn apply_command(mixer: &mut StreamingMixer, pads: &mut PadBank, command: EngineCommand) {
    match command {
        EngineCommand::LoadPad { pad, sample } => {
            pads.load(pad, sample);
        }
        EngineCommand::UnloadPad { pad } => pads.unload(pad),
        EngineCommand::TriggerPad { pad, gain } => {
            // Every fresh onset fades in from silence
            if pads.trigger(pad, gain) {
                mixer.trigger_attack_fade();
            }
        }
        EngineCommand::ReleasePad { pad } => pads.release(pad),
        EngineCommand::StopAll => pads.stop_all(),
        EngineCommand::SetMasterGain(gain) => pads.set_master_gain(gain),
        EngineCommand::SetMix { dry, wet } => mixer.set_mix(dry, wet),
        EngineCommand::SetEffectActive(active) => mixer.set_effect_active(active),
        EngineCommand::SetSendActive(active) => mixer.set_send_active(active),
        EngineCommand::TriggerAttackFade => mixer.trigger_attack_fade(),
        EngineCommand::SetLowPassEnabled(enabled) => mixer.set_low_pass_enabled(enabled),
        EngineCommand::SetLowPassCutoff(cutoff_hz) => mixer.set_low_pass_cutoff(cutoff_hz),
        EngineCommand::SetLowPassQ(q) => mixer.set_low_pass_q(q),
        EngineCommand::SetCutoffSlewRate(slew) => mixer.set_cutoff_slew_rate(slew),
        EngineCommand::SetDelayTimeMs(time_ms) => mixer.set_delay_time_ms(time_ms),
        EngineCommand::SetDelayDepth(depth) => mixer.set_delay_depth(depth),
        EngineCommand::SetDelayFeedback(feedback) => mixer.set_delay_feedback(feedback),
        EngineCommand::SetCompressor(params) => mixer.set_compressor(params),
        EngineCommand::SetCompressorEnabled(enabled) => mixer.set_compressor_enabled(enabled),
    }
}

/// Sink adapter exposing the device's f32 buffer to the byte-oriented mixer.
///
/// Borrows the buffer exclusively for one callback; whatever the mixer does
/// not fill is zeroed by `finish`.
struct DeviceSink<'a> {
    data: &'a mut [f32],
    pos: usize,
    width: SampleWidth,
}

impl<'a> DeviceSink<'a> {
    fn new(data: &'a mut [f32], width: SampleWidth) -> Self {
        Self {
            data,
            pos: 0,
            width,
        }
    }

    /// Zero-fill whatever was not produced (underrun safety).
    fn finish(self) {
        self.data[self.pos..].fill(0.0);
    }
}

impl FrameSink for DeviceSink<'_> {
    fn write(&mut self, bytes: &[u8]) -> usize {
        let mut accepted = 0;
        match self.width {
            SampleWidth::I16 => {
                for chunk in bytes.chunks_exact(2) {
                    if self.pos >= self.data.len() {
                        break;
                    }
                    let value = i16::from_ne_bytes([chunk[0], chunk[1]]);
                    self.data[self.pos] = value as f32 / 32_768.0;
                    self.pos += 1;
                    accepted += 2;
                }
            }
            SampleWidth::I32 => {
                for chunk in bytes.chunks_exact(4) {
                    if self.pos >= self.data.len() {
                        break;
                    }
                    let value = i32::from_ne_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
                    self.data[self.pos] = value as f32 / 2_147_483_648.0;
                    self.pos += 1;
                    accepted += 4;
                }
            }
        }
        accepted
    }
}
