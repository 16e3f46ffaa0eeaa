//! Stereo reverb
//!
//! Freeverb topology (parallel damped combs into series allpasses) with the
//! comb feedback derived from the requested decay time, so `decay` is the
//! time for the tail to fall by 60 dB.

use super::settings::ReverbSettings;
use crate::effect::Effect;
use crate::types::StereoBuffer;

/// Comb filter delay line lengths (in samples at 44.1kHz)
/// These are prime-ish numbers to avoid resonances
const COMB_LENGTHS: [usize; 8] = [1557, 1617, 1491, 1422, 1277, 1356, 1188, 1116];

/// Allpass filter delay line lengths
const ALLPASS_LENGTHS: [usize; 4] = [225, 556, 441, 341];

/// Stereo spread offset for the right channel (in samples at 44.1kHz)
const STEREO_SPREAD: usize = 23;

const ALLPASS_FEEDBACK: f32 = 0.5;

/// Gain compensation for comb filter summing
const COMB_GAIN: f32 = 0.2;

/// High frequency damping in the comb loops
const DAMPING: f32 = 0.2;

/// Upper bound on comb feedback, keeps the loops stable
const MAX_FEEDBACK: f32 = 0.98;

/// Comb filter for reverb
#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
    feedback: f32,
}

impl CombFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
            filter_state: 0.0,
            feedback: 0.0,
        }
    }

    /// Feedback that gives -60 dB after `decay` seconds
    fn set_decay(&mut self, decay: f32, sample_rate: f32) {
        let loop_secs = self.buffer.len() as f32 / sample_rate;
        self.feedback = 10.0_f32.powf(-3.0 * loop_secs / decay).min(MAX_FEEDBACK);
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let output = self.buffer[self.pos];

        // One-pole lowpass for damping high frequencies
        self.filter_state = output * (1.0 - DAMPING) + self.filter_state * DAMPING;

        self.buffer[self.pos] = input + self.filter_state * self.feedback;
        self.pos = (self.pos + 1) % self.buffer.len();

        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
    }
}

/// Allpass filter for diffusion
#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(length: usize) -> Self {
        Self {
            buffer: vec![0.0; length.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let buffered = self.buffer[self.pos];
        let output = -input + buffered;
        self.buffer[self.pos] = input + buffered * ALLPASS_FEEDBACK;
        self.pos = (self.pos + 1) % self.buffer.len();
        output
    }

    fn reset(&mut self) {
        self.buffer.fill(0.0);
    }
}

/// Freeverb-style stereo reverb with wet/dry mix
///
/// `wet_dry = 0` is fully dry; the dry path is scaled by `1 - wet_dry`.
/// When disabled the signal passes untouched and the tail is discarded, so
/// re-enabling starts from silence.
#[derive(Debug, Clone)]
pub struct Reverb {
    sample_rate: f32,
    settings: ReverbSettings,
    combs_l: Vec<CombFilter>,
    combs_r: Vec<CombFilter>,
    allpass_l: Vec<AllpassFilter>,
    allpass_r: Vec<AllpassFilter>,
}

impl Reverb {
    pub fn new(sample_rate: u32) -> Self {
        let sr = sample_rate as f32;
        let scale = |len: usize| (len as f32 * sr / 44100.0) as usize;

        let mut reverb = Self {
            sample_rate: sr,
            settings: ReverbSettings::default(),
            combs_l: COMB_LENGTHS.iter().map(|&len| CombFilter::new(scale(len))).collect(),
            combs_r: COMB_LENGTHS
                .iter()
                .map(|&len| CombFilter::new(scale(len + STEREO_SPREAD)))
                .collect(),
            allpass_l: ALLPASS_LENGTHS.iter().map(|&len| AllpassFilter::new(scale(len))).collect(),
            allpass_r: ALLPASS_LENGTHS
                .iter()
                .map(|&len| AllpassFilter::new(scale(len + STEREO_SPREAD)))
                .collect(),
        };
        reverb.update_decay();
        reverb
    }

    /// Apply new (already clamped) settings
    pub fn set_settings(&mut self, settings: ReverbSettings) {
        let was_enabled = self.settings.enabled;
        let decay_changed = settings.decay != self.settings.decay;
        self.settings = settings;

        if decay_changed {
            self.update_decay();
        }
        if settings.enabled && !was_enabled {
            self.reset();
        }
    }

    pub fn settings(&self) -> &ReverbSettings {
        &self.settings
    }

    fn update_decay(&mut self) {
        let (decay, sr) = (self.settings.decay, self.sample_rate);
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.set_decay(decay, sr);
        }
    }
}

impl Effect for Reverb {
    fn process(&mut self, buffer: &mut StereoBuffer) {
        if !self.settings.enabled {
            return;
        }

        let wet = self.settings.wet_dry;
        let dry = 1.0 - wet;

        for sample in buffer.iter_mut() {
            let input = (sample.left + sample.right) * 0.5;

            let mut out_l = 0.0f32;
            let mut out_r = 0.0f32;
            for comb in &mut self.combs_l {
                out_l += comb.process(input);
            }
            for comb in &mut self.combs_r {
                out_r += comb.process(input);
            }
            out_l *= COMB_GAIN;
            out_r *= COMB_GAIN;

            for ap in &mut self.allpass_l {
                out_l = ap.process(out_l);
            }
            for ap in &mut self.allpass_r {
                out_r = ap.process(out_r);
            }

            sample.left = out_l * wet + sample.left * dry;
            sample.right = out_r * wet + sample.right * dry;
        }
    }

    fn reset(&mut self) {
        for comb in self.combs_l.iter_mut().chain(self.combs_r.iter_mut()) {
            comb.reset();
        }
        for ap in self.allpass_l.iter_mut().chain(self.allpass_r.iter_mut()) {
            ap.reset();
        }
    }
}
