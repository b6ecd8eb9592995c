//! Digital Signal Processing effects for the sampler's output path
//!
//! This module provides the effects used by the streaming mixer:
//! - Slew-limited low-pass filter (biquad-based IIR, one per channel)
//! - Feedback delay line (circular buffer, mono send/return)
//! - Dynamics compressor (linked-channel, post-mix)
//!
//! All effects are designed for:
//! - Zero allocations in the hot path
//! - Per-sample processing inside a hard real-time callback
//! - In-place reconfiguration from the control context
//!
//! Samples on the internal path are `f32` values in the signed 16-bit range
//! (the mixer narrows 32-bit input to this width and widens on output).

use tracing::trace;

/// Full scale of the internal 16-bit sample path.
pub const FULL_SCALE: f32 = 32_768.0;

/// Largest representable sample value on the internal path.
pub const SAMPLE_MAX: f32 = 32_767.0;

/// Smallest representable sample value on the internal path.
pub const SAMPLE_MIN: f32 = -32_768.0;

/// Parameter constraints for the DSP effects
///
/// All parameters are clamped to these ranges at the setter boundary so the
/// audio path never sees an out-of-range value.
pub mod params {
    /// Low-pass cutoff range (Hz)
    pub const CUTOFF_MIN_HZ: f32 = 300.0;
    pub const CUTOFF_MAX_HZ: f32 = 4_500.0;
    pub const CUTOFF_DEFAULT_HZ: f32 = 500.0;

    /// Low-pass resonance range
    pub const Q_MIN: f32 = 0.2;
    pub const Q_MAX: f32 = 2.5;
    pub const Q_DEFAULT: f32 = 0.8071;

    /// Cutoff slew rate range (Hz per second)
    pub const SLEW_MIN_HZ_PER_SEC: f32 = 100.0;
    pub const SLEW_MAX_HZ_PER_SEC: f32 = 20_000.0;
    pub const SLEW_DEFAULT_HZ_PER_SEC: f32 = 8_000.0;

    /// Delay time range (ms)
    pub const DELAY_TIME_MIN_MS: f32 = 50.0;
    pub const DELAY_TIME_MAX_MS: f32 = 2_000.0;
    pub const DELAY_TIME_DEFAULT_MS: f32 = 420.0;

    /// Delay wet contribution within the effect
    pub const DELAY_DEPTH_MIN: f32 = 0.0;
    pub const DELAY_DEPTH_MAX: f32 = 1.0;
    pub const DELAY_DEPTH_DEFAULT: f32 = 0.40;

    /// Feedback stays below unity so the tail always decays
    pub const DELAY_FEEDBACK_MIN: f32 = 0.0;
    pub const DELAY_FEEDBACK_MAX: f32 = 0.95;
    pub const DELAY_FEEDBACK_DEFAULT: f32 = 0.45;

    /// Compressor timing ranges (ms)
    pub const COMP_ATTACK_MIN_MS: f32 = 1.0;
    pub const COMP_ATTACK_MAX_MS: f32 = 100.0;
    pub const COMP_ATTACK_DEFAULT_MS: f32 = 12.0;
    pub const COMP_RELEASE_MIN_MS: f32 = 10.0;
    pub const COMP_RELEASE_MAX_MS: f32 = 500.0;
    pub const COMP_RELEASE_DEFAULT_MS: f32 = 70.0;
    pub const COMP_HOLD_MIN_MS: f32 = 0.0;
    pub const COMP_HOLD_MAX_MS: f32 = 100.0;
    pub const COMP_HOLD_DEFAULT_MS: f32 = 12.0;

    /// Compressor threshold, percent of full scale
    pub const COMP_THRESHOLD_MIN: f32 = 0.0;
    pub const COMP_THRESHOLD_MAX: f32 = 100.0;
    pub const COMP_THRESHOLD_DEFAULT: f32 = 18.0;

    /// Compressor ratio, (0, 1] where lower is stronger
    pub const COMP_RATIO_MIN: f32 = 0.1;
    pub const COMP_RATIO_MAX: f32 = 1.0;
    pub const COMP_RATIO_DEFAULT: f32 = 0.75;
}

// ============================================================================
// BIQUAD FILTER (low-level IIR filter behind the slewed low-pass)
// ============================================================================

/// Biquad filter coefficients
///
/// Direct Form I implementation for numerical stability.
/// Coefficients are pre-computed so the per-sample cost is five multiplies.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    /// Numerator coefficients
    pub b0: f32,
    pub b1: f32,
    pub b2: f32,
    /// Denominator coefficients (a0 is normalized to 1.0)
    pub a1: f32,
    pub a2: f32,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        // Unity gain (no filtering)
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }
}

impl BiquadCoeffs {
    /// Calculate coefficients for a second-order low-pass filter
    ///
    /// # Parameters
    /// - `sample_rate`: Audio sample rate in Hz
    /// - `freq`: Cutoff frequency in Hz (guarded against the Nyquist limit)
    /// - `q`: Q factor (resonance)
    #[must_use]
    pub fn low_pass(sample_rate: f32, freq: f32, q: f32) -> Self {
        if !sample_rate.is_finite() || sample_rate <= 0.0 {
            return Self::default();
        }

        let nyquist_guard = (sample_rate * 0.5 * 0.9).max(1.0);
        let freq = freq.clamp(1.0, nyquist_guard);

        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / (2.0 * q);

        let b0 = (1.0 - cos_w0) * 0.5;
        let b1 = 1.0 - cos_w0;
        let b2 = (1.0 - cos_w0) * 0.5;
        let a0 = 1.0 + alpha;
        let a1 = -2.0 * cos_w0;
        let a2 = 1.0 - alpha;

        let inv_a0 = 1.0 / a0;
        let coeffs = Self {
            b0: b0 * inv_a0,
            b1: b1 * inv_a0,
            b2: b2 * inv_a0,
            a1: a1 * inv_a0,
            a2: a2 * inv_a0,
        };

        if [coeffs.b0, coeffs.b1, coeffs.b2, coeffs.a1, coeffs.a2]
            .iter()
            .all(|v| v.is_finite())
        {
            coeffs
        } else {
            Self::default()
        }
    }
}

// ============================================================================
// SLEW-LIMITED LOW-PASS FILTER (one instance per channel)
// ============================================================================

/// Low-pass filter whose cutoff tracks its target at a bounded rate.
///
/// The effective cutoff moves toward the target by at most
/// `slew_hz_per_sec / sample_rate` Hz per processed sample, so continuous
/// cutoff sweeps (a pot being turned) stay free of zipper noise.
/// Coefficients are recomputed only while the cutoff is actually moving;
/// once the target is reached the per-sample cost is the biquad alone.
/// Q changes take effect immediately since they come from manual tuning
/// rather than continuous tracking.
#[derive(Debug, Clone)]
pub struct SlewedLowPass {
    sample_rate: f32,
    target_cutoff_hz: f32,
    effective_cutoff_hz: f32,
    q: f32,
    slew_step_hz: f32,
    enabled: bool,
    coeffs: BiquadCoeffs,
    // Previous input samples (x[n-1], x[n-2])
    x1: f32,
    x2: f32,
    // Previous output samples (y[n-1], y[n-2])
    y1: f32,
    y2: f32,
}

impl SlewedLowPass {
    pub fn new(sample_rate: u32, cutoff_hz: f32, q: f32, slew_hz_per_sec: f32) -> Self {
        let sr = sample_rate.max(1) as f32;
        let cutoff = cutoff_hz.clamp(params::CUTOFF_MIN_HZ, params::CUTOFF_MAX_HZ);
        let q = q.clamp(params::Q_MIN, params::Q_MAX);
        let slew = slew_hz_per_sec.clamp(params::SLEW_MIN_HZ_PER_SEC, params::SLEW_MAX_HZ_PER_SEC);

        Self {
            sample_rate: sr,
            target_cutoff_hz: cutoff,
            effective_cutoff_hz: cutoff,
            q,
            slew_step_hz: slew / sr,
            enabled: true,
            coeffs: BiquadCoeffs::low_pass(sr, cutoff, q),
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Set the target cutoff. The effective cutoff slews toward it.
    pub fn set_target_cutoff(&mut self, cutoff_hz: f32) {
        self.target_cutoff_hz = cutoff_hz.clamp(params::CUTOFF_MIN_HZ, params::CUTOFF_MAX_HZ);
    }

    /// Set Q. Applies immediately at the current effective cutoff.
    pub fn set_q(&mut self, q: f32) {
        self.q = q.clamp(params::Q_MIN, params::Q_MAX);
        self.coeffs = BiquadCoeffs::low_pass(self.sample_rate, self.effective_cutoff_hz, self.q);
    }

    /// Set the maximum cutoff change rate in Hz per second.
    pub fn set_slew_rate(&mut self, slew_hz_per_sec: f32) {
        let slew = slew_hz_per_sec.clamp(params::SLEW_MIN_HZ_PER_SEC, params::SLEW_MAX_HZ_PER_SEC);
        self.slew_step_hz = slew / self.sample_rate;
    }

    /// Enable or disable the filter. Disabled is a passthrough with frozen
    /// state so re-enabling resumes from where the filter left off.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn target_cutoff_hz(&self) -> f32 {
        self.target_cutoff_hz
    }

    pub fn effective_cutoff_hz(&self) -> f32 {
        self.effective_cutoff_hz
    }

    /// Advance the effective cutoff one slew step toward the target.
    #[inline]
    fn step_cutoff(&mut self) {
        let diff = self.target_cutoff_hz - self.effective_cutoff_hz;
        if diff == 0.0 {
            return;
        }

        if diff.abs() <= self.slew_step_hz {
            self.effective_cutoff_hz = self.target_cutoff_hz;
        } else {
            self.effective_cutoff_hz += self.slew_step_hz.copysign(diff);
        }

        self.coeffs = BiquadCoeffs::low_pass(self.sample_rate, self.effective_cutoff_hz, self.q);
    }

    /// Process a single sample, advancing the cutoff slew first.
    #[inline]
    pub fn process_sample(&mut self, x: f32) -> f32 {
        if !self.enabled {
            return x;
        }

        self.step_cutoff();

        // Direct Form I: y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
        //                        - a1*y[n-1] - a2*y[n-2]
        let y = self.coeffs.b0 * x + self.coeffs.b1 * self.x1 + self.coeffs.b2 * self.x2
            - self.coeffs.a1 * self.y1
            - self.coeffs.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = x;
        self.y2 = self.y1;
        self.y1 = y;

        y
    }

    /// Reset filter state (not parameters).
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

// ============================================================================
// DELAY LINE
// ============================================================================

/// Mono feedback delay line over a circular buffer.
///
/// The buffer is allocated once for the maximum supported duration at the
/// configured sample rate; duration changes adjust the cursor spacing only,
/// so the control context never triggers a reallocation mid-stream.
/// Feedback is clamped below unity, which bounds the tail energy.
#[derive(Debug, Clone)]
pub struct DelayLine {
    buffer: Vec<f32>,
    write_pos: usize,
    duration_frames: usize,
    duration_ms: f32,
    depth: f32,
    feedback: f32,
    sample_rate: u32,
}

impl DelayLine {
    pub fn new(sample_rate: u32, duration_ms: f32, depth: f32, feedback: f32) -> Self {
        let sample_rate = sample_rate.max(1);
        let capacity = Self::capacity_for(sample_rate);
        let mut delay = Self {
            buffer: vec![0.0; capacity],
            write_pos: 0,
            duration_frames: 1,
            duration_ms: params::DELAY_TIME_DEFAULT_MS,
            depth: params::DELAY_DEPTH_DEFAULT,
            feedback: params::DELAY_FEEDBACK_DEFAULT,
            sample_rate,
        };
        delay.set_duration_ms(duration_ms);
        delay.set_depth(depth);
        delay.set_feedback(feedback);
        delay
    }

    /// Frames needed to cover the maximum supported delay time, validated
    /// here so later duration changes can never exhaust the buffer.
    fn capacity_for(sample_rate: u32) -> usize {
        let max_frames =
            (sample_rate as u64 * params::DELAY_TIME_MAX_MS as u64).div_ceil(1000) as usize;
        max_frames + 1
    }

    /// Re-derive the buffer for a new sample rate. This is the only path
    /// that reallocates, and it runs from the control context during stream
    /// (re)configuration.
    pub fn configure_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1);
        let capacity = Self::capacity_for(self.sample_rate);
        self.buffer.clear();
        self.buffer.resize(capacity, 0.0);
        self.write_pos = 0;
        let duration_ms = self.duration_ms;
        self.set_duration_ms(duration_ms);
        trace!(
            sample_rate = self.sample_rate,
            capacity, "Delay buffer reconfigured"
        );
    }

    /// Set the delay time. Takes effect by moving the read offset; the
    /// buffered tail is preserved.
    pub fn set_duration_ms(&mut self, duration_ms: f32) {
        self.duration_ms = duration_ms.clamp(params::DELAY_TIME_MIN_MS, params::DELAY_TIME_MAX_MS);
        let frames = (self.sample_rate as f32 * self.duration_ms / 1000.0) as usize;
        self.duration_frames = frames.clamp(1, self.buffer.len().saturating_sub(1));
    }

    pub fn set_depth(&mut self, depth: f32) {
        self.depth = depth.clamp(params::DELAY_DEPTH_MIN, params::DELAY_DEPTH_MAX);
    }

    pub fn set_feedback(&mut self, feedback: f32) {
        self.feedback = feedback.clamp(params::DELAY_FEEDBACK_MIN, params::DELAY_FEEDBACK_MAX);
    }

    pub fn duration_ms(&self) -> f32 {
        self.duration_ms
    }

    pub fn depth(&self) -> f32 {
        self.depth
    }

    pub fn feedback(&self) -> f32 {
        self.feedback
    }

    /// Process one input sample and produce the wet sample.
    ///
    /// Reads the sample delayed by the configured duration, writes
    /// `input + feedback * delayed` at the write cursor, and returns the
    /// delayed sample scaled by the depth. Feeding zeros keeps the tail
    /// advancing and decaying, which is exactly what a disabled send does.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let capacity = self.buffer.len();
        let read_pos = (self.write_pos + capacity - self.duration_frames) % capacity;
        let delayed = self.buffer[read_pos];

        self.buffer[self.write_pos] = input + self.feedback * delayed;
        self.write_pos += 1;
        if self.write_pos >= capacity {
            self.write_pos = 0;
        }

        delayed * self.depth
    }

    /// Silence the buffered tail.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }
}

// ============================================================================
// DYNAMICS COMPRESSOR
// ============================================================================

/// Compressor parameters
///
/// `ratio` follows the output-scaling convention: above the threshold the
/// overshoot is multiplied by `ratio`, so 1.0 is transparent and smaller
/// values compress harder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompressorParams {
    pub attack_ms: f32,
    pub release_ms: f32,
    pub hold_ms: f32,
    pub threshold_percent: f32,
    pub ratio: f32,
    pub enabled: bool,
}

impl CompressorParams {
    /// Copy with every field clamped to its supported range.
    #[must_use]
    pub fn clamped(self) -> Self {
        Self {
            attack_ms: self
                .attack_ms
                .clamp(params::COMP_ATTACK_MIN_MS, params::COMP_ATTACK_MAX_MS),
            release_ms: self
                .release_ms
                .clamp(params::COMP_RELEASE_MIN_MS, params::COMP_RELEASE_MAX_MS),
            hold_ms: self
                .hold_ms
                .clamp(params::COMP_HOLD_MIN_MS, params::COMP_HOLD_MAX_MS),
            threshold_percent: self
                .threshold_percent
                .clamp(params::COMP_THRESHOLD_MIN, params::COMP_THRESHOLD_MAX),
            ratio: self.ratio.clamp(params::COMP_RATIO_MIN, params::COMP_RATIO_MAX),
            enabled: self.enabled,
        }
    }
}

impl Default for CompressorParams {
    fn default() -> Self {
        Self {
            attack_ms: params::COMP_ATTACK_DEFAULT_MS,
            release_ms: params::COMP_RELEASE_DEFAULT_MS,
            hold_ms: params::COMP_HOLD_DEFAULT_MS,
            threshold_percent: params::COMP_THRESHOLD_DEFAULT,
            ratio: params::COMP_RATIO_DEFAULT,
            enabled: true,
        }
    }
}

/// Linked-channel dynamics compressor applied to the already-mixed signal.
///
/// An envelope follower tracks the per-frame peak across channels; when the
/// envelope exceeds the threshold, the gain-reduction target scales the
/// overshoot by `ratio`. The applied gain chases that target with the attack
/// coefficient on the way down and the release coefficient on the way up,
/// with the hold time delaying the release.
///
/// `enabled = false` is a transparent bypass that freezes the envelope and
/// gain state, so re-enabling resumes smoothly instead of re-attacking from
/// scratch.
#[derive(Debug, Clone)]
pub struct Compressor {
    params: CompressorParams,
    sample_rate: f32,
    attack_coeff: f32,
    release_coeff: f32,
    hold_frames: u32,
    // Envelope follower state, persists across process calls
    envelope: f32,
    gain: f32,
    hold_remaining: u32,
}

impl Compressor {
    pub fn new(sample_rate: u32, params: CompressorParams) -> Self {
        let mut comp = Self {
            params: params.clamped(),
            sample_rate: sample_rate.max(1) as f32,
            attack_coeff: 0.0,
            release_coeff: 0.0,
            hold_frames: 0,
            envelope: 0.0,
            gain: 1.0,
            hold_remaining: 0,
        };
        comp.update_coefficients();
        comp
    }

    /// Replace every parameter at once. Applied whole from the control
    /// context, so the audio path never observes a half-updated set.
    pub fn set_params(&mut self, params: CompressorParams) {
        self.params = params.clamped();
        self.update_coefficients();
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.params.enabled = enabled;
    }

    pub fn params(&self) -> CompressorParams {
        self.params
    }

    /// Re-derive frame counts after a sample-rate change.
    pub fn configure_sample_rate(&mut self, sample_rate: u32) {
        self.sample_rate = sample_rate.max(1) as f32;
        self.update_coefficients();
        self.reset();
    }

    fn update_coefficients(&mut self) {
        // exp(-1/(time * rate)) gives a one-pole smoother with the requested
        // time constant
        self.attack_coeff = (-1.0 / (self.params.attack_ms * 0.001 * self.sample_rate)).exp();
        self.release_coeff = (-1.0 / (self.params.release_ms * 0.001 * self.sample_rate)).exp();
        self.hold_frames = (self.params.hold_ms * 0.001 * self.sample_rate) as u32;
    }

    /// Process one frame of interleaved channel values in-place.
    #[inline]
    pub fn process_frame(&mut self, frame: &mut [f32]) {
        if !self.params.enabled {
            return;
        }

        let peak = frame.iter().fold(0.0_f32, |m, s| m.max(s.abs())) / FULL_SCALE;

        let env_coeff = if peak > self.envelope {
            self.attack_coeff
        } else {
            self.release_coeff
        };
        self.envelope = env_coeff * self.envelope + (1.0 - env_coeff) * peak;

        let threshold = self.params.threshold_percent / 100.0;
        let target_gain = if self.envelope > threshold {
            let compressed = threshold + (self.envelope - threshold) * self.params.ratio;
            compressed / self.envelope
        } else {
            1.0
        };

        if target_gain < self.gain {
            self.gain = self.attack_coeff * self.gain + (1.0 - self.attack_coeff) * target_gain;
            self.hold_remaining = self.hold_frames;
        } else if self.hold_remaining > 0 {
            self.hold_remaining -= 1;
        } else {
            self.gain = self.release_coeff * self.gain + (1.0 - self.release_coeff) * target_gain;
        }

        for sample in frame.iter_mut() {
            *sample *= self.gain;
        }
    }

    /// Reset envelope state to initial conditions.
    pub fn reset(&mut self) {
        self.envelope = 0.0;
        self.gain = 1.0;
        self.hold_remaining = 0;
    }
}

// ============================================================================
// TESTS
// ============================================================================
