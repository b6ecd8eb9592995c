//! Ramp and gate state machines for click-free level changes
//!
//! Both machines advance exactly once per processed frame and are cheap
//! no-ops once they reach their terminal state.

/// Linear wet-level ramp.
///
/// Two states: at-target (every advance returns the target) and ramping
/// (linear interpolation over a scheduled frame count). Scheduling always
/// recomputes the per-frame delta from the current value, so re-targeting
/// mid-ramp bends the trajectory instead of jumping. The overshoot clamp is
/// direction-aware and the value snaps onto the target when the count runs
/// out, so convergence is exact rather than approximate.
#[derive(Debug, Clone, Copy, Default)]
pub struct WetRamp {
    current: f32,
    target: f32,
    delta: f32,
    remaining_frames: u32,
}

impl WetRamp {
    /// Jump straight to `target` with no ramp (mix-knob semantics).
    pub fn snap_to(&mut self, target: f32) {
        self.current = target;
        self.target = target;
        self.delta = 0.0;
        self.remaining_frames = 0;
    }

    /// Schedule a linear transition from the current value to `target`
    /// over `frames` frames (effect-toggle semantics).
    pub fn schedule(&mut self, target: f32, frames: u32) {
        self.target = target;
        if frames <= 1 {
            self.snap_to(target);
            return;
        }
        self.remaining_frames = frames;
        self.delta = (target - self.current) / frames as f32;
    }

    /// Advance one frame and return the level to use for that frame.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        if self.remaining_frames > 0 {
            self.current += self.delta;
            self.remaining_frames -= 1;

            let overshot = (self.delta > 0.0 && self.current > self.target)
                || (self.delta < 0.0 && self.current < self.target);
            if overshot || self.remaining_frames == 0 {
                self.snap_to(self.target);
            }
        } else {
            // Latched: float drift cannot accumulate once at the target
            self.current = self.target;
        }
        self.current
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn is_ramping(&self) -> bool {
        self.remaining_frames > 0
    }
}

/// Linear fade-in gate masking the onset of a freshly triggered sample.
///
/// Gain rises from 0 to 1 over the configured frame count; once open the
/// gate is a no-op. Re-triggering restarts the fade at full duration
/// regardless of prior state, treating every trigger as a fresh onset.
#[derive(Debug, Clone, Copy)]
pub struct AttackGate {
    remaining_frames: u32,
    total_frames: u32,
}

impl AttackGate {
    pub fn new(total_frames: u32) -> Self {
        Self {
            remaining_frames: 0,
            total_frames: total_frames.max(1),
        }
    }

    /// Change the fade duration; the gate opens fully (a reconfiguration is
    /// a stream format change, not a trigger).
    pub fn configure(&mut self, total_frames: u32) {
        self.total_frames = total_frames.max(1);
        self.remaining_frames = 0;
    }

    /// Restart the fade at full duration.
    pub fn trigger(&mut self) {
        self.remaining_frames = self.total_frames;
    }

    /// Advance one frame and return the gain to apply for that frame.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        if self.remaining_frames == 0 {
            return 1.0;
        }
        let gain = 1.0 - self.remaining_frames as f32 / self.total_frames as f32;
        self.remaining_frames -= 1;
        if self.remaining_frames == 0 {
            return 1.0;
        }
        gain.clamp(0.0, 1.0)
    }

    pub fn is_open(&self) -> bool {
        self.remaining_frames == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_converges_exactly() {
        let mut ramp = WetRamp::default();
        ramp.schedule(0.75, 264);

        for _ in 0..263 {
            let level = ramp.advance();
            assert!(level < 0.75);
        }
        // Exactly at the end of the window the level equals the target
        assert_eq!(ramp.advance(), 0.75);
        assert!(!ramp.is_ramping());
    }

    #[test]
    fn test_ramp_monotonic_up_and_down() {
        let mut ramp = WetRamp::default();
        ramp.schedule(1.0, 100);
        let mut prev = 0.0;
        for _ in 0..100 {
            let level = ramp.advance();
            assert!(level >= prev);
            prev = level;
        }
        assert_eq!(prev, 1.0);

        ramp.schedule(0.25, 50);
        for _ in 0..50 {
            let level = ramp.advance();
            assert!(level <= prev);
            prev = level;
        }
        assert_eq!(prev, 0.25);
    }

    #[test]
    fn test_ramp_latches_after_target() {
        let mut ramp = WetRamp::default();
        ramp.schedule(0.5, 10);
        for _ in 0..10 {
            ramp.advance();
        }
        for _ in 0..100 {
            assert_eq!(ramp.advance(), 0.5);
        }
    }

    #[test]
    fn test_ramp_retarget_mid_flight() {
        let mut ramp = WetRamp::default();
        ramp.schedule(1.0, 100);
        for _ in 0..50 {
            ramp.advance();
        }
        let mid = ramp.current();
        assert!(mid > 0.0 && mid < 1.0);

        // Reverse direction from wherever we are
        ramp.schedule(0.0, 50);
        for _ in 0..50 {
            ramp.advance();
        }
        assert_eq!(ramp.current(), 0.0);
    }

    #[test]
    fn test_ramp_single_frame_is_instant() {
        let mut ramp = WetRamp::default();
        ramp.schedule(0.8, 1);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.advance(), 0.8);
    }

    #[test]
    fn test_snap_to_skips_ramping() {
        let mut ramp = WetRamp::default();
        ramp.schedule(1.0, 1_000);
        ramp.advance();
        ramp.snap_to(0.3);
        assert!(!ramp.is_ramping());
        assert_eq!(ramp.advance(), 0.3);
    }

    #[test]
    fn test_gate_open_by_default() {
        let mut gate = AttackGate::new(441);
        assert!(gate.is_open());
        assert_eq!(gate.advance(), 1.0);
    }

    #[test]
    fn test_gate_rises_monotonically_to_one() {
        let mut gate = AttackGate::new(441);
        gate.trigger();

        let mut prev = -1.0;
        for _ in 0..441 {
            let gain = gate.advance();
            assert!(gain >= prev);
            prev = gain;
        }
        // Reaches exactly 1.0 at the end of the window
        assert_eq!(prev, 1.0);
        assert!(gate.is_open());
    }

    #[test]
    fn test_gate_starts_from_silence() {
        let mut gate = AttackGate::new(100);
        gate.trigger();
        assert_eq!(gate.advance(), 0.0);
    }

    #[test]
    fn test_gate_retrigger_restarts_fade() {
        let mut gate = AttackGate::new(100);
        gate.trigger();
        for _ in 0..60 {
            gate.advance();
        }
        assert!(!gate.is_open());

        // Retrigger mid-fade: the next frame starts over from silence
        gate.trigger();
        assert_eq!(gate.advance(), 0.0);
    }
}
