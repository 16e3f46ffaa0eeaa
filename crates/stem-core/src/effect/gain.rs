//! Gain stage - smoothed volume control

use crate::effect::Effect;
use crate::types::StereoBuffer;

/// Below this distance from the target the ramp snaps to it
const SETTLE_EPSILON: f32 = 1e-5;

/// A volume multiplier that ramps towards its target
///
/// Uses a one-pole ramp with the configured time constant, so volume, mute
/// and solo changes never step the signal. Zero latency.
#[derive(Debug, Clone)]
pub struct GainStage {
    current: f32,
    target: f32,
    /// Per-sample smoothing coefficient (0 = jump immediately)
    coeff: f32,
}

impl GainStage {
    /// Create a gain stage that starts settled at `initial`
    pub fn new(sample_rate: u32, smoothing_secs: f32, initial: f32) -> Self {
        let samples = smoothing_secs * sample_rate as f32;
        let coeff = if samples > 0.0 { (-1.0 / samples).exp() } else { 0.0 };
        Self {
            current: initial,
            target: initial,
            coeff,
        }
    }

    /// Set the value to ramp towards
    pub fn set_target(&mut self, gain: f32) {
        self.target = gain;
    }

    /// Jump to `gain` without ramping (used when nothing is playing)
    pub fn snap(&mut self, gain: f32) {
        self.target = gain;
        self.current = gain;
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    /// Whether the ramp has reached its target
    pub fn is_settled(&self) -> bool {
        self.current == self.target
    }
}

impl Effect for GainStage {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if self.is_settled() {
            if self.current != 1.0 {
                buffer.scale(self.current);
            }
            return;
        }

        for sample in buffer.iter_mut() {
            self.current = self.target + (self.current - self.target) * self.coeff;
            if (self.current - self.target).abs() < SETTLE_EPSILON {
                self.current = self.target;
            }
            *sample *= self.current;
        }
    }

    fn reset(&mut self) {
        self.current = self.target;
    }
}
