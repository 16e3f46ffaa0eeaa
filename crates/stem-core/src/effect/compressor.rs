//! Dynamics compressor with a lock-free gain reduction meter
//!
//! Feed-forward design: a peak envelope follower with separate attack and
//! release, a soft-knee gain computer and makeup gain. The current gain
//! reduction is published to a [`ReductionMeter`] after every block so the
//! UI can poll it from any thread without touching the render path.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use super::settings::CompressorSettings;
use crate::effect::Effect;
use crate::types::StereoBuffer;

/// Floor used when converting silence to dB
const SILENCE_DB: f32 = -120.0;

/// Shared gain reduction reading in dB (always <= 0, 0 = no reduction)
///
/// Cloning shares the underlying atomic. Uses Relaxed ordering: a meter
/// reading one block stale is fine.
#[derive(Debug, Clone, Default)]
pub struct ReductionMeter {
    bits: Arc<AtomicU32>,
}

impl ReductionMeter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current gain reduction in dB
    pub fn read(&self) -> f32 {
        f32::from_bits(self.bits.load(Ordering::Relaxed))
    }

    fn store(&self, db: f32) {
        // -0.0 would print as "-0 dB"
        let db = if db < 0.0 { db } else { 0.0 };
        self.bits.store(db.to_bits(), Ordering::Relaxed);
    }
}

#[inline]
fn linear_to_db(linear: f32) -> f32 {
    if linear <= 0.0 {
        SILENCE_DB
    } else {
        (20.0 * linear.log10()).max(SILENCE_DB)
    }
}

#[inline]
fn db_to_linear(db: f32) -> f32 {
    10.0_f32.powf(db / 20.0)
}

/// One-pole coefficient for a time constant (0 s = instant)
#[inline]
fn time_coeff(seconds: f32, sample_rate: f32) -> f32 {
    let samples = seconds * sample_rate;
    if samples > 0.0 {
        (-1.0 / samples).exp()
    } else {
        0.0
    }
}

/// Stereo-linked feed-forward compressor
#[derive(Debug)]
pub struct Compressor {
    sample_rate: f32,
    settings: CompressorSettings,
    attack_coeff: f32,
    release_coeff: f32,
    /// Peak envelope (linear)
    envelope: f32,
    meter: ReductionMeter,
}

impl Compressor {
    pub fn new(sample_rate: u32) -> Self {
        let mut comp = Self {
            sample_rate: sample_rate as f32,
            settings: CompressorSettings::default(),
            attack_coeff: 0.0,
            release_coeff: 0.0,
            envelope: 0.0,
            meter: ReductionMeter::new(),
        };
        comp.update_coeffs();
        comp
    }

    /// Apply new (already clamped) settings
    ///
    /// Disabling clears the meter immediately.
    pub fn set_settings(&mut self, settings: CompressorSettings) {
        self.settings = settings;
        self.update_coeffs();
        if !settings.enabled {
            self.meter.store(0.0);
        }
    }

    pub fn settings(&self) -> &CompressorSettings {
        &self.settings
    }

    /// Handle for polling gain reduction from another thread
    pub fn meter(&self) -> ReductionMeter {
        self.meter.clone()
    }

    /// Current gain reduction in dB (<= 0)
    pub fn gain_reduction_db(&self) -> f32 {
        self.meter.read()
    }

    fn update_coeffs(&mut self) {
        self.attack_coeff = time_coeff(self.settings.attack, self.sample_rate);
        self.release_coeff = time_coeff(self.settings.release, self.sample_rate);
    }

    /// Gain change in dB (<= 0) for an input level in dB
    #[inline]
    fn compute_gain(&self, input_db: f32) -> f32 {
        let CompressorSettings { threshold, ratio, knee, .. } = self.settings;
        let slope = 1.0 - 1.0 / ratio;

        if knee <= 0.0 {
            if input_db <= threshold {
                0.0
            } else {
                (threshold - input_db) * slope
            }
        } else {
            let half_knee = knee / 2.0;
            let knee_start = threshold - half_knee;
            let knee_end = threshold + half_knee;

            if input_db <= knee_start {
                0.0
            } else if input_db >= knee_end {
                (threshold - input_db) * slope
            } else {
                // Quadratic interpolation through the knee
                let x = input_db - knee_start;
                -slope * x * x / (2.0 * knee)
            }
        }
    }
}

impl Effect for Compressor {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.settings.enabled {
            return;
        }

        let makeup_db = self.settings.makeup_gain;
        let mut reduction_db = 0.0;

        for sample in buffer.iter_mut() {
            let level = sample.peak();
            let coeff = if level > self.envelope {
                self.attack_coeff
            } else {
                self.release_coeff
            };
            self.envelope = coeff * self.envelope + (1.0 - coeff) * level;

            reduction_db = self.compute_gain(linear_to_db(self.envelope));
            *sample *= db_to_linear(reduction_db + makeup_db);
        }

        if !buffer.is_empty() {
            self.meter.store(reduction_db);
        }
    }

    fn reset(&mut self) {
        self.envelope = 0.0;
        self.meter.store(0.0);
    }
}
