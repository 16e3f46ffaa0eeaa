//! Per-stem effects chain: gain → EQ → compressor → reverb
//!
//! The processors are built once and never rebuilt. Every update merges into
//! the current settings value and re-applies it to the existing processors.

use super::compressor::{Compressor, ReductionMeter};
use super::eq::ThreeBandEq;
use super::gain::GainStage;
use super::presets::{CompressorPreset, EqPreset, ReverbPreset};
use super::reverb::Reverb;
use super::settings::{CompressorUpdate, EqUpdate, ReverbUpdate, StemEffects};
use crate::effect::Effect;
use crate::error::EngineResult;
use crate::types::StereoBuffer;

/// Signal chain for a single stem
#[derive(Debug)]
pub struct EffectsChain {
    settings: StemEffects,
    gain: GainStage,
    eq: ThreeBandEq,
    compressor: Compressor,
    reverb: Reverb,
}

impl EffectsChain {
    /// Build a chain with default (neutral) settings and unity gain
    pub fn new(sample_rate: u32, smoothing_secs: f32) -> Self {
        Self {
            settings: StemEffects::default(),
            gain: GainStage::new(sample_rate, smoothing_secs, 1.0),
            eq: ThreeBandEq::new(sample_rate),
            compressor: Compressor::new(sample_rate),
            reverb: Reverb::new(sample_rate),
        }
    }

    /// Current settings value
    pub fn settings(&self) -> &StemEffects {
        &self.settings
    }

    /// Replace all settings at once (values must already be validated)
    pub fn set_settings(&mut self, settings: StemEffects) {
        self.settings = settings;
        self.eq.set_settings(settings.eq);
        self.compressor.set_settings(settings.compressor);
        self.reverb.set_settings(settings.reverb);
    }

    pub fn update_eq(&mut self, update: &EqUpdate) -> EngineResult<()> {
        let eq = self.settings.eq.merged(update)?;
        self.settings.eq = eq;
        self.eq.set_settings(eq);
        Ok(())
    }

    pub fn apply_eq_preset(&mut self, name: &str) -> EngineResult<()> {
        let preset: EqPreset = name.parse()?;
        self.settings.eq = preset.settings();
        self.eq.set_settings(self.settings.eq);
        Ok(())
    }

    pub fn update_compressor(&mut self, update: &CompressorUpdate) -> EngineResult<()> {
        let compressor = self.settings.compressor.merged(update)?;
        self.settings.compressor = compressor;
        self.compressor.set_settings(compressor);
        Ok(())
    }

    pub fn apply_compressor_preset(&mut self, name: &str) -> EngineResult<()> {
        let preset: CompressorPreset = name.parse()?;
        self.settings.compressor = preset.settings();
        self.compressor.set_settings(self.settings.compressor);
        Ok(())
    }

    pub fn update_reverb(&mut self, update: &ReverbUpdate) -> EngineResult<()> {
        let reverb = self.settings.reverb.merged(update)?;
        self.settings.reverb = reverb;
        self.reverb.set_settings(reverb);
        Ok(())
    }

    pub fn apply_reverb_preset(&mut self, name: &str) -> EngineResult<()> {
        let preset: ReverbPreset = name.parse()?;
        self.settings.reverb = preset.settings();
        self.reverb.set_settings(self.settings.reverb);
        Ok(())
    }

    /// Restore default settings
    pub fn reset(&mut self) {
        self.set_settings(StemEffects::default());
    }

    /// Instantaneous compressor gain reduction in dB (<= 0)
    pub fn compressor_reduction(&self) -> f32 {
        self.compressor.gain_reduction_db()
    }

    /// Meter handle readable from any thread
    pub fn reduction_meter(&self) -> ReductionMeter {
        self.compressor.meter()
    }

    /// Set the in-chain stem gain (ramped)
    pub fn set_gain(&mut self, gain: f32) {
        self.gain.set_target(gain);
    }

    /// Set the in-chain stem gain without ramping
    pub fn snap_gain(&mut self, gain: f32) {
        self.gain.snap(gain);
    }

    pub fn gain(&self) -> f32 {
        self.gain.target()
    }

    /// Clear all DSP state (delay lines, envelopes, filter memory)
    ///
    /// Settings are kept. Called on seek, stop and natural end so stale
    /// tails do not bleed into the new position.
    pub fn flush(&mut self) {
        self.gain.reset();
        self.eq.reset();
        self.compressor.reset();
        self.reverb.reset();
    }

    /// Run one block through the chain in place
    pub fn process(&mut self, buffer: &mut StereoBuffer) {
        self.gain.process(buffer);
        self.eq.process(buffer);
        self.compressor.process(buffer);
        self.reverb.process(buffer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::settings::{CompressorSettings, EqSettings, ReverbSettings};
    use crate::error::EngineError;
    use crate::types::StereoSample;

    fn chain() -> EffectsChain {
        EffectsChain::new(48000, 0.0)
    }

    #[test]
    fn test_default_chain_is_transparent() {
        let mut chain = chain();
        let input = StereoBuffer::from_vec(
            (0..256).map(|i| StereoSample::mono((i as f32 * 0.01).sin())).collect(),
        );
        let mut buffer = input.clone();
        chain.process(&mut buffer);
        for (a, b) in input.iter().zip(buffer.iter()) {
            assert_eq!(a, b);
        }
    }

    #[test]
    fn test_presets_overwrite_and_unknown_is_rejected() {
        let mut chain = chain();
        chain.update_eq(&EqUpdate { low_gain: Some(-9.0), ..Default::default() }).unwrap();
        chain.apply_eq_preset("bright").unwrap();
        assert_eq!(
            chain.settings().eq,
            EqSettings { low_gain: -2.0, mid_gain: 0.0, high_gain: 4.0 }
        );

        let before = *chain.settings();
        let err = chain.apply_reverb_preset("cathedral").unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert_eq!(*chain.settings(), before);
    }

    #[test]
    fn test_preset_atomicity_of_update() {
        let mut chain = chain();
        chain.apply_compressor_preset("vocals").unwrap();
        let before = *chain.settings();

        let result = chain.update_compressor(&CompressorUpdate {
            threshold: Some(-40.0),
            release: Some(f32::NAN),
            ..Default::default()
        });
        assert!(result.is_err());
        assert_eq!(*chain.settings(), before);
    }

    #[test]
    fn test_reset_equals_default_and_is_idempotent() {
        let mut chain = chain();
        chain.apply_eq_preset("scoop").unwrap();
        chain.apply_compressor_preset("heavy").unwrap();
        chain.apply_reverb_preset("ambient").unwrap();

        chain.reset();
        assert_eq!(*chain.settings(), StemEffects::default());
        chain.reset();
        assert_eq!(*chain.settings(), StemEffects::default());
        assert_eq!(chain.settings().compressor, CompressorSettings::default());
        assert_eq!(chain.settings().reverb, ReverbSettings::default());
    }

    #[test]
    fn test_reduction_is_zero_until_compressing() {
        let mut chain = chain();
        assert_eq!(chain.compressor_reduction(), 0.0);

        chain.apply_compressor_preset("drums").unwrap();
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(0.8); 4800]);
        chain.process(&mut buffer);
        assert!(chain.compressor_reduction() < 0.0);
        assert!(chain.reduction_meter().read() < 0.0);
    }

    #[test]
    fn test_gain_is_applied_first() {
        let mut chain = chain();
        chain.snap_gain(0.0);
        chain.apply_reverb_preset("hall").unwrap();
        let mut buffer = StereoBuffer::from_vec(vec![StereoSample::mono(1.0); 2048]);
        chain.process(&mut buffer);
        assert_eq!(buffer.peak(), 0.0);
    }
}
