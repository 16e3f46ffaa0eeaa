//! Three-band equalizer
//!
//! Low shelf at 320 Hz, peaking mid at 1 kHz (Q = 1), high shelf at 3.2 kHz.
//! Gain changes only recompute coefficients; filter state is kept so edits
//! during playback do not click.

use super::settings::EqSettings;
use crate::effect::Effect;
use crate::types::{StereoBuffer, StereoSample};

/// EQ frequency centers
pub const EQ_LOW_FREQ: f32 = 320.0; // Low shelf
pub const EQ_MID_FREQ: f32 = 1000.0; // Mid peak
pub const EQ_HIGH_FREQ: f32 = 3200.0; // High shelf
pub const EQ_MID_Q: f32 = 1.0;

/// Shelf slope (S) used by both shelving bands
const SHELF_SLOPE: f32 = 1.0;

/// Bands closer to 0 dB than this run as passthrough
const FLAT_EPSILON_DB: f32 = 0.01;

/// Biquad filter state for one band, both channels
#[derive(Debug, Clone, Default)]
struct BiquadState {
    x1_l: f32, x2_l: f32, y1_l: f32, y2_l: f32,
    x1_r: f32, x2_r: f32, y1_r: f32, y2_r: f32,
}

impl BiquadState {
    #[inline]
    fn process(&mut self, input_l: f32, input_r: f32, c: &BiquadCoeffs) -> (f32, f32) {
        let out_l = c.b0 * input_l + c.b1 * self.x1_l + c.b2 * self.x2_l
                  - c.a1 * self.y1_l - c.a2 * self.y2_l;
        self.x2_l = self.x1_l;
        self.x1_l = input_l;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let out_r = c.b0 * input_r + c.b1 * self.x1_r + c.b2 * self.x2_r
                  - c.a1 * self.y1_r - c.a2 * self.y2_r;
        self.x2_r = self.x1_r;
        self.x1_r = input_r;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Biquad coefficients (RBJ cookbook, normalized by a0)
#[derive(Debug, Clone, PartialEq)]
struct BiquadCoeffs {
    b0: f32, b1: f32, b2: f32,
    a1: f32, a2: f32,
}

impl BiquadCoeffs {
    fn shelf_alpha(a: f32, sin_w0: f32) -> f32 {
        sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / SHELF_SLOPE - 1.0) + 2.0).sqrt()
    }

    fn low_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = Self::shelf_alpha(a, w0.sin());
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        Self {
            b0: (a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (-2.0 * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
        }
    }

    fn peaking(freq: f32, gain_db: f32, q: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = w0.sin() / (2.0 * q);

        let a0 = 1.0 + alpha / a;
        Self {
            b0: (1.0 + alpha * a) / a0,
            b1: (-2.0 * cos_w0) / a0,
            b2: (1.0 - alpha * a) / a0,
            a1: (-2.0 * cos_w0) / a0,
            a2: (1.0 - alpha / a) / a0,
        }
    }

    fn high_shelf(freq: f32, gain_db: f32, sample_rate: f32) -> Self {
        let a = 10.0_f32.powf(gain_db / 40.0);
        let w0 = 2.0 * std::f32::consts::PI * freq / sample_rate;
        let cos_w0 = w0.cos();
        let alpha = Self::shelf_alpha(a, w0.sin());
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        Self {
            b0: (a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha)) / a0,
            b1: (-2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0)) / a0,
            b2: (a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha)) / a0,
            a1: (2.0 * ((a - 1.0) - (a + 1.0) * cos_w0)) / a0,
            a2: ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha) / a0,
        }
    }

    fn passthrough() -> Self {
        Self { b0: 1.0, b1: 0.0, b2: 0.0, a1: 0.0, a2: 0.0 }
    }
}

/// Low/mid/high equalizer, always in circuit
#[derive(Debug, Clone)]
pub struct ThreeBandEq {
    sample_rate: f32,
    settings: EqSettings,
    low_state: BiquadState,
    mid_state: BiquadState,
    high_state: BiquadState,
    low_coeffs: BiquadCoeffs,
    mid_coeffs: BiquadCoeffs,
    high_coeffs: BiquadCoeffs,
    dirty: bool,
}

impl ThreeBandEq {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate: sample_rate as f32,
            settings: EqSettings::default(),
            low_state: BiquadState::default(),
            mid_state: BiquadState::default(),
            high_state: BiquadState::default(),
            low_coeffs: BiquadCoeffs::passthrough(),
            mid_coeffs: BiquadCoeffs::passthrough(),
            high_coeffs: BiquadCoeffs::passthrough(),
            dirty: true,
        }
    }

    /// Apply new (already clamped) band gains
    pub fn set_settings(&mut self, settings: EqSettings) {
        if settings != self.settings {
            self.settings = settings;
            self.dirty = true;
        }
    }

    pub fn settings(&self) -> &EqSettings {
        &self.settings
    }

    /// Whether every band is at 0 dB
    pub fn is_flat(&self) -> bool {
        self.settings.low_gain.abs() <= FLAT_EPSILON_DB
            && self.settings.mid_gain.abs() <= FLAT_EPSILON_DB
            && self.settings.high_gain.abs() <= FLAT_EPSILON_DB
    }

    fn update_coeffs(&mut self) {
        if !self.dirty {
            return;
        }

        let sr = self.sample_rate;
        let EqSettings { low_gain, mid_gain, high_gain } = self.settings;

        self.low_coeffs = if low_gain.abs() > FLAT_EPSILON_DB {
            BiquadCoeffs::low_shelf(EQ_LOW_FREQ, low_gain, sr)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.mid_coeffs = if mid_gain.abs() > FLAT_EPSILON_DB {
            BiquadCoeffs::peaking(EQ_MID_FREQ, mid_gain, EQ_MID_Q, sr)
        } else {
            BiquadCoeffs::passthrough()
        };
        self.high_coeffs = if high_gain.abs() > FLAT_EPSILON_DB {
            BiquadCoeffs::high_shelf(EQ_HIGH_FREQ, high_gain, sr)
        } else {
            BiquadCoeffs::passthrough()
        };

        self.dirty = false;
    }
}

impl Effect for ThreeBandEq {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        self.update_coeffs();

        for sample in buffer.iter_mut() {
            let (mut left, mut right) = (sample.left, sample.right);
            (left, right) = self.low_state.process(left, right, &self.low_coeffs);
            (left, right) = self.mid_state.process(left, right, &self.mid_coeffs);
            (left, right) = self.high_state.process(left, right, &self.high_coeffs);
            *sample = StereoSample::new(left, right);
        }
    }

    fn reset(&mut self) {
        self.low_state.reset();
        self.mid_state.reset();
        self.high_state.reset();
    }
}
