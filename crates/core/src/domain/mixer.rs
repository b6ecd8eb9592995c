//! Streaming dry/wet mixer
//!
//! This module provides the core of the output path: a mixer that consumes
//! interleaved PCM, filters each channel through a slew-limited low-pass,
//! taps a mono send into the feedback delay, blends the ramped wet return
//! with the dry signal, applies the attack gate, compresses the result, and
//! emits frames to a downstream sink in the same stream format.
//!
//! Everything here runs inside the real-time audio context: no allocation,
//! no blocking, no fallible paths. Configuration problems degrade to a
//! passthrough or a no-op instead of erroring mid-stream.

use crate::domain::audio::{FrameSink, PcmFormat, SampleWidth};
use crate::domain::dsp::{
    params, Compressor, CompressorParams, DelayLine, SlewedLowPass, SAMPLE_MAX, SAMPLE_MIN,
};
use tracing::{debug, warn};

pub mod fade;
pub use fade::{AttackGate, WetRamp};

/// Duration of the wet-level ramp scheduled by effect/send toggles.
pub const EFFECT_TOGGLE_FADE_MS: u32 = 6;

/// Duration of the attack fade applied at the start of a new sample trigger.
pub const SAMPLE_ATTACK_FADE_MS: u32 = 10;

/// Default static dry level.
pub const DRY_LEVEL_DEFAULT: f32 = 1.0;

/// Default wet level while the effect is active.
pub const WET_LEVEL_DEFAULT: f32 = 0.75;

// Largest number of frames processed per inner chunk; all scratch buffers
// are sized for this at configure time.
const MAX_CHUNK_FRAMES: usize = 256;

/// Streaming mixer combining one dry sample voice with one delay return.
///
/// Constructed unconfigured; [`configure`](Self::configure) must run with the
/// negotiated stream format before any audio flows. Parameter setters are
/// called from the control context, `write`/`pump_silence` from the audio
/// context; the engine serializes the two by applying commands between
/// buffers.
pub struct StreamingMixer {
    format: PcmFormat,
    /// `None` while the bit depth is unsupported (degraded passthrough).
    width: Option<SampleWidth>,
    configured: bool,

    dry_level: f32,
    wet_active_level: f32,
    effect_enabled: bool,
    send_active: bool,
    ramp: WetRamp,
    gate: AttackGate,
    ramp_frames: u32,

    filter_cutoff_hz: f32,
    filter_q: f32,
    filter_slew_hz_per_sec: f32,
    filter_enabled: bool,
    filters: Vec<SlewedLowPass>,

    delay: DelayLine,
    compressor: Compressor,

    // Partial trailing frame carried between write calls
    pending: Vec<u8>,
    pending_len: usize,

    // Scratch buffers, sized once at configure time
    converted: Vec<f32>,
    frame_scratch: Vec<f32>,
    mixed: Vec<i16>,
    out_bytes: Vec<u8>,
    silence: Vec<u8>,
}

impl StreamingMixer {
    pub fn new() -> Self {
        Self {
            format: PcmFormat::default(),
            width: None,
            configured: false,
            dry_level: DRY_LEVEL_DEFAULT,
            wet_active_level: WET_LEVEL_DEFAULT,
            effect_enabled: false,
            send_active: true,
            ramp: WetRamp::default(),
            gate: AttackGate::new(1),
            ramp_frames: 1,
            filter_cutoff_hz: params::CUTOFF_DEFAULT_HZ,
            filter_q: params::Q_DEFAULT,
            filter_slew_hz_per_sec: params::SLEW_DEFAULT_HZ_PER_SEC,
            filter_enabled: true,
            filters: Vec::new(),
            delay: DelayLine::new(
                44_100,
                params::DELAY_TIME_DEFAULT_MS,
                params::DELAY_DEPTH_DEFAULT,
                params::DELAY_FEEDBACK_DEFAULT,
            ),
            compressor: Compressor::new(44_100, CompressorParams::default()),
            pending: Vec::new(),
            pending_len: 0,
            converted: Vec::new(),
            frame_scratch: Vec::new(),
            mixed: Vec::new(),
            out_bytes: Vec::new(),
            silence: Vec::new(),
        }
    }

    /// (Re)initialize for a stream format.
    ///
    /// Derives ramp and attack frame counts, rebuilds the per-channel
    /// filters, resizes the delay for the new sample rate, and resets the
    /// ramp to at-target and the gate to open. A format with an unsupported
    /// bit depth leaves the mixer in a dry-passthrough mode; a format with
    /// zero channels or a zero sample rate leaves it unconfigured.
    pub fn configure(&mut self, format: PcmFormat) {
        self.format = format;
        self.width = format.width();
        self.configured = format.is_streamable();
        self.pending_len = 0;

        if !self.configured {
            warn!(
                sample_rate = format.sample_rate,
                channels = format.channels,
                "Mixer left unconfigured by unusable stream format"
            );
            return;
        }

        if self.width.is_none() {
            warn!(
                bits = format.bits_per_sample,
                "Unsupported bit depth, mixer degrades to dry passthrough"
            );
        }

        let channels = format.channels as usize;
        self.ramp_frames = format.frames_for_ms(EFFECT_TOGGLE_FADE_MS);
        self.gate.configure(format.frames_for_ms(SAMPLE_ATTACK_FADE_MS));
        self.ramp.snap_to(self.effective_wet_target());

        self.filters.clear();
        for _ in 0..channels {
            let mut filter = SlewedLowPass::new(
                format.sample_rate,
                self.filter_cutoff_hz,
                self.filter_q,
                self.filter_slew_hz_per_sec,
            );
            filter.set_enabled(self.filter_enabled);
            self.filters.push(filter);
        }

        self.delay.configure_sample_rate(format.sample_rate);
        self.compressor.configure_sample_rate(format.sample_rate);

        let frame_bytes = format.frame_bytes();
        self.pending.clear();
        self.pending.resize(frame_bytes, 0);
        self.converted.clear();
        self.converted.resize(MAX_CHUNK_FRAMES * channels, 0.0);
        self.frame_scratch.clear();
        self.frame_scratch.resize(channels, 0.0);
        self.mixed.clear();
        self.mixed.resize(MAX_CHUNK_FRAMES * channels, 0);
        self.out_bytes.clear();
        self.out_bytes.resize(MAX_CHUNK_FRAMES * frame_bytes, 0);
        self.silence.clear();
        self.silence.resize(MAX_CHUNK_FRAMES * frame_bytes, 0);

        debug!(
            sample_rate = format.sample_rate,
            channels = format.channels,
            bits = format.bits_per_sample,
            ramp_frames = self.ramp_frames,
            "Mixer configured"
        );
    }

    /// Consume interleaved PCM, process it, and write the mixed frames to
    /// `sink`. Returns the number of bytes consumed; a partial trailing
    /// frame is buffered and carried into the next call.
    pub fn write(&mut self, sink: &mut dyn FrameSink, data: &[u8]) -> usize {
        if !self.configured || data.is_empty() {
            return 0;
        }
        if self.width.is_none() {
            // Degraded mode: dry bytes pass through untouched
            return sink.write(data);
        }

        let frame_bytes = self.format.frame_bytes();
        let mut data = data;
        let mut processed = 0;

        while !data.is_empty() {
            if self.pending_len > 0 || data.len() < frame_bytes {
                let needed = frame_bytes - self.pending_len;
                let take = needed.min(data.len());
                self.pending[self.pending_len..self.pending_len + take]
                    .copy_from_slice(&data[..take]);
                self.pending_len += take;
                data = &data[take..];
                processed += take;
                if self.pending_len < frame_bytes {
                    break;
                }
                let pending = std::mem::take(&mut self.pending);
                self.mix_and_write(sink, &pending[..frame_bytes]);
                self.pending = pending;
                self.pending_len = 0;
                continue;
            }

            let whole = (data.len() / frame_bytes) * frame_bytes;
            let chunk_len = whole.min(MAX_CHUNK_FRAMES * frame_bytes);
            self.mix_and_write(sink, &data[..chunk_len]);
            data = &data[chunk_len..];
            processed += chunk_len;
        }

        processed
    }

    /// Run `frames` of zero-valued input through the full pipeline.
    ///
    /// Keeps the delay and filter state evolving while no real audio is
    /// playing, so a disabled send or a stopped player lets the effect tail
    /// ring out instead of freezing it.
    pub fn pump_silence(&mut self, sink: &mut dyn FrameSink, frames: usize) {
        if !self.configured || frames == 0 {
            return;
        }

        let frame_bytes = self.format.frame_bytes();
        let mut remaining = frames;
        while remaining > 0 {
            let n = remaining.min(MAX_CHUNK_FRAMES);
            let silence = std::mem::take(&mut self.silence);
            if self.width.is_none() {
                sink.write(&silence[..n * frame_bytes]);
            } else {
                self.mix_and_write(sink, &silence[..n * frame_bytes]);
            }
            self.silence = silence;
            remaining -= n;
        }
    }

    /// Set the static dry level and the active wet target.
    ///
    /// Mix-knob semantics: takes effect immediately without re-ramping, as
    /// opposed to effect toggles which always ramp.
    pub fn set_mix(&mut self, dry: f32, wet: f32) {
        self.dry_level = dry.clamp(0.0, 1.0);
        self.wet_active_level = wet.clamp(0.0, 1.0);
        self.ramp.snap_to(self.effective_wet_target());
        debug!(
            dry = self.dry_level,
            wet = self.wet_active_level,
            "Mix levels set"
        );
    }

    /// Gate whether the wet signal is audible at all. Drives the ramp
    /// target; the transition is always ramped, never a jump.
    pub fn set_effect_active(&mut self, active: bool) {
        self.effect_enabled = active;
        self.ramp
            .schedule(self.effective_wet_target(), self.ramp_frames);
        debug!(active, target = self.ramp.target(), "Effect toggled");
    }

    /// Gate whether new audio feeds the delay. A disabled send pumps
    /// silence into the delay instead, letting the buffered tail ring out.
    /// Scheduled as a ramp like every toggle.
    pub fn set_send_active(&mut self, active: bool) {
        self.send_active = active;
        self.ramp
            .schedule(self.effective_wet_target(), self.ramp_frames);
        debug!(active, "Delay send toggled");
    }

    /// Restart the attack gate so the next frames fade in from silence.
    pub fn trigger_attack_fade(&mut self) {
        self.gate.trigger();
    }

    pub fn set_low_pass_cutoff(&mut self, cutoff_hz: f32) {
        self.filter_cutoff_hz = cutoff_hz.clamp(params::CUTOFF_MIN_HZ, params::CUTOFF_MAX_HZ);
        for filter in &mut self.filters {
            filter.set_target_cutoff(self.filter_cutoff_hz);
        }
    }

    pub fn set_low_pass_q(&mut self, q: f32) {
        self.filter_q = q.clamp(params::Q_MIN, params::Q_MAX);
        for filter in &mut self.filters {
            filter.set_q(self.filter_q);
        }
    }

    pub fn set_cutoff_slew_rate(&mut self, slew_hz_per_sec: f32) {
        self.filter_slew_hz_per_sec =
            slew_hz_per_sec.clamp(params::SLEW_MIN_HZ_PER_SEC, params::SLEW_MAX_HZ_PER_SEC);
        for filter in &mut self.filters {
            filter.set_slew_rate(self.filter_slew_hz_per_sec);
        }
    }

    pub fn set_low_pass_enabled(&mut self, enabled: bool) {
        self.filter_enabled = enabled;
        for filter in &mut self.filters {
            filter.set_enabled(enabled);
        }
    }

    pub fn set_delay_time_ms(&mut self, time_ms: f32) {
        self.delay.set_duration_ms(time_ms);
    }

    pub fn set_delay_depth(&mut self, depth: f32) {
        self.delay.set_depth(depth);
    }

    pub fn set_delay_feedback(&mut self, feedback: f32) {
        self.delay.set_feedback(feedback);
    }

    /// Replace the compressor parameters wholesale.
    pub fn set_compressor(&mut self, params: CompressorParams) {
        self.compressor.set_params(params);
    }

    pub fn set_compressor_enabled(&mut self, enabled: bool) {
        self.compressor.set_enabled(enabled);
    }

    pub fn is_configured(&self) -> bool {
        self.configured
    }

    pub fn is_degraded(&self) -> bool {
        self.configured && self.width.is_none()
    }

    pub fn format(&self) -> PcmFormat {
        self.format
    }

    /// Wet level applied to the most recently processed frame.
    pub fn current_wet_level(&self) -> f32 {
        self.ramp.current()
    }

    /// Wet level the ramp is heading toward.
    pub fn target_wet_level(&self) -> f32 {
        self.ramp.target()
    }

    /// Frame count of the effect-toggle ramp at the configured sample rate.
    pub fn effect_fade_frames(&self) -> u32 {
        self.ramp_frames
    }

    pub fn attack_gate_open(&self) -> bool {
        self.gate.is_open()
    }

    fn effective_wet_target(&self) -> f32 {
        if self.effect_enabled {
            self.wet_active_level
        } else {
            0.0
        }
    }

    /// Process whole frames from `chunk` (at most `MAX_CHUNK_FRAMES`) and
    /// write the result to the sink.
    fn mix_and_write(&mut self, sink: &mut dyn FrameSink, chunk: &[u8]) {
        let width = match self.width {
            Some(width) => width,
            None => {
                sink.write(chunk);
                return;
            }
        };

        let channels = self.format.channels as usize;
        let frame_bytes = self.format.frame_bytes();
        let frames = chunk.len() / frame_bytes;
        if frames == 0 {
            return;
        }
        let samples = frames * channels;

        // Narrow the input to the internal 16-bit-range path
        match width {
            SampleWidth::I16 => {
                for (dst, src) in self.converted[..samples]
                    .iter_mut()
                    .zip(chunk.chunks_exact(2))
                {
                    *dst = i16::from_ne_bytes([src[0], src[1]]) as f32;
                }
            }
            SampleWidth::I32 => {
                for (dst, src) in self.converted[..samples]
                    .iter_mut()
                    .zip(chunk.chunks_exact(4))
                {
                    let wide = i32::from_ne_bytes([src[0], src[1], src[2], src[3]]);
                    *dst = (wide >> 16) as f32;
                }
            }
        }

        let dry_level = self.dry_level;
        for frame in 0..frames {
            let base = frame * channels;

            let mut mono = 0.0_f32;
            for ch in 0..channels {
                let filtered = self.filters[ch]
                    .process_sample(self.converted[base + ch])
                    .clamp(SAMPLE_MIN, SAMPLE_MAX);
                self.frame_scratch[ch] = filtered;
                mono += filtered;
            }
            mono /= channels as f32;

            // A disabled send feeds zeros but still clocks the delay, so an
            // in-flight tail keeps advancing and decaying.
            let send = if self.send_active { mono } else { 0.0 };
            let wet_sample = self.delay.process(send);

            let wet_level = self.ramp.advance();
            let attack_gain = self.gate.advance();

            for ch in 0..channels {
                let mut value = dry_level * self.frame_scratch[ch] + wet_level * wet_sample;
                if attack_gain < 0.999 {
                    value *= attack_gain;
                }
                self.frame_scratch[ch] = value.clamp(SAMPLE_MIN, SAMPLE_MAX);
            }

            self.compressor.process_frame(&mut self.frame_scratch[..channels]);

            for ch in 0..channels {
                self.mixed[base + ch] = self.frame_scratch[ch] as i16;
            }
        }

        // Widen back to the configured stream width
        let out_len = frames * frame_bytes;
        match width {
            SampleWidth::I16 => {
                for (dst, s) in self.out_bytes[..out_len]
                    .chunks_exact_mut(2)
                    .zip(&self.mixed[..samples])
                {
                    dst.copy_from_slice(&s.to_ne_bytes());
                }
            }
            SampleWidth::I32 => {
                for (dst, s) in self.out_bytes[..out_len]
                    .chunks_exact_mut(4)
                    .zip(&self.mixed[..samples])
                {
                    dst.copy_from_slice(&((*s as i32) << 16).to_ne_bytes());
                }
            }
        }

        sink.write(&self.out_bytes[..out_len]);
    }
}

impl Default for StreamingMixer {
    fn default() -> Self {
        Self::new()
    }
}
