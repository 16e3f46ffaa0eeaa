//! Effect settings values and partial updates
//!
//! Settings are plain `Copy` values the UI can read at any time. Updates are
//! partial: `None` fields keep their current value. Every merge checks all
//! supplied values before touching anything, so a rejected update never
//! leaves half-applied settings behind.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// EQ band gain range in dB
pub const EQ_GAIN_RANGE: (f32, f32) = (-12.0, 12.0);
/// Compressor threshold range in dB
pub const THRESHOLD_RANGE: (f32, f32) = (-60.0, 0.0);
/// Compressor ratio range
pub const RATIO_RANGE: (f32, f32) = (1.0, 20.0);
/// Compressor attack range in seconds
pub const ATTACK_RANGE: (f32, f32) = (0.0, 0.1);
/// Compressor release range in seconds
pub const RELEASE_RANGE: (f32, f32) = (0.01, 1.0);
/// Compressor knee range in dB
pub const KNEE_RANGE: (f32, f32) = (0.0, 40.0);
/// Compressor makeup gain range in dB
pub const MAKEUP_RANGE: (f32, f32) = (0.0, 12.0);
/// Reverb wet/dry range (0 = fully dry)
pub const WET_DRY_RANGE: (f32, f32) = (0.0, 1.0);
/// Reverb decay range in seconds
pub const DECAY_RANGE: (f32, f32) = (0.1, 8.0);

#[inline]
fn clamp_to(value: f32, (min, max): (f32, f32)) -> f32 {
    value.clamp(min, max)
}

/// Reject non-finite values, naming the offending field
fn check_finite(fields: &[(&str, Option<f32>)]) -> EngineResult<()> {
    for (name, value) in fields {
        if let Some(v) = value {
            if !v.is_finite() {
                return Err(EngineError::invalid(format!("{} must be finite, got {}", name, v)));
            }
        }
    }
    Ok(())
}

/// Three-band equalizer gains in dB
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EqSettings {
    pub low_gain: f32,
    pub mid_gain: f32,
    pub high_gain: f32,
}

/// Partial EQ update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EqUpdate {
    pub low_gain: Option<f32>,
    pub mid_gain: Option<f32>,
    pub high_gain: Option<f32>,
}

impl EqSettings {
    /// Merge an update into a copy of these settings, clamping every gain
    pub fn merged(&self, update: &EqUpdate) -> EngineResult<Self> {
        check_finite(&[
            ("lowGain", update.low_gain),
            ("midGain", update.mid_gain),
            ("highGain", update.high_gain),
        ])?;
        Ok(Self {
            low_gain: update.low_gain.unwrap_or(self.low_gain),
            mid_gain: update.mid_gain.unwrap_or(self.mid_gain),
            high_gain: update.high_gain.unwrap_or(self.high_gain),
        }
        .clamped())
    }

    fn clamped(self) -> Self {
        Self {
            low_gain: clamp_to(self.low_gain, EQ_GAIN_RANGE),
            mid_gain: clamp_to(self.mid_gain, EQ_GAIN_RANGE),
            high_gain: clamp_to(self.high_gain, EQ_GAIN_RANGE),
        }
    }

    fn as_update(&self) -> EqUpdate {
        EqUpdate {
            low_gain: Some(self.low_gain),
            mid_gain: Some(self.mid_gain),
            high_gain: Some(self.high_gain),
        }
    }
}

/// Dynamics compressor settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompressorSettings {
    pub enabled: bool,
    /// dB
    pub threshold: f32,
    pub ratio: f32,
    /// Seconds
    pub attack: f32,
    /// Seconds
    pub release: f32,
    /// dB
    pub knee: f32,
    /// dB
    pub makeup_gain: f32,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            threshold: 0.0,
            ratio: 1.0,
            attack: 0.003,
            release: 0.25,
            knee: 0.0,
            makeup_gain: 0.0,
        }
    }
}

/// Partial compressor update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CompressorUpdate {
    pub enabled: Option<bool>,
    pub threshold: Option<f32>,
    pub ratio: Option<f32>,
    pub attack: Option<f32>,
    pub release: Option<f32>,
    pub knee: Option<f32>,
    pub makeup_gain: Option<f32>,
}

impl CompressorSettings {
    /// Merge an update into a copy of these settings, clamping every field
    pub fn merged(&self, update: &CompressorUpdate) -> EngineResult<Self> {
        check_finite(&[
            ("threshold", update.threshold),
            ("ratio", update.ratio),
            ("attack", update.attack),
            ("release", update.release),
            ("knee", update.knee),
            ("makeupGain", update.makeup_gain),
        ])?;
        Ok(Self {
            enabled: update.enabled.unwrap_or(self.enabled),
            threshold: clamp_to(update.threshold.unwrap_or(self.threshold), THRESHOLD_RANGE),
            ratio: clamp_to(update.ratio.unwrap_or(self.ratio), RATIO_RANGE),
            attack: clamp_to(update.attack.unwrap_or(self.attack), ATTACK_RANGE),
            release: clamp_to(update.release.unwrap_or(self.release), RELEASE_RANGE),
            knee: clamp_to(update.knee.unwrap_or(self.knee), KNEE_RANGE),
            makeup_gain: clamp_to(update.makeup_gain.unwrap_or(self.makeup_gain), MAKEUP_RANGE),
        })
    }

    fn as_update(&self) -> CompressorUpdate {
        CompressorUpdate {
            enabled: Some(self.enabled),
            threshold: Some(self.threshold),
            ratio: Some(self.ratio),
            attack: Some(self.attack),
            release: Some(self.release),
            knee: Some(self.knee),
            makeup_gain: Some(self.makeup_gain),
        }
    }
}

/// Reverb settings
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReverbSettings {
    pub enabled: bool,
    pub wet_dry: f32,
    /// Seconds
    pub decay: f32,
}

impl Default for ReverbSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            wet_dry: 0.0,
            decay: 0.1,
        }
    }
}

/// Partial reverb update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ReverbUpdate {
    pub enabled: Option<bool>,
    pub wet_dry: Option<f32>,
    pub decay: Option<f32>,
}

impl ReverbSettings {
    /// Merge an update into a copy of these settings, clamping every field
    pub fn merged(&self, update: &ReverbUpdate) -> EngineResult<Self> {
        check_finite(&[("wetDry", update.wet_dry), ("decay", update.decay)])?;
        Ok(Self {
            enabled: update.enabled.unwrap_or(self.enabled),
            wet_dry: clamp_to(update.wet_dry.unwrap_or(self.wet_dry), WET_DRY_RANGE),
            decay: clamp_to(update.decay.unwrap_or(self.decay), DECAY_RANGE),
        })
    }

    fn as_update(&self) -> ReverbUpdate {
        ReverbUpdate {
            enabled: Some(self.enabled),
            wet_dry: Some(self.wet_dry),
            decay: Some(self.decay),
        }
    }
}

/// Complete effect settings for one stem
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StemEffects {
    pub eq: EqSettings,
    pub compressor: CompressorSettings,
    pub reverb: ReverbSettings,
}

impl StemEffects {
    /// Validate externally supplied settings (e.g. from a stored preset)
    ///
    /// Non-finite values are rejected; everything else is clamped.
    pub fn validated(&self) -> EngineResult<Self> {
        let base = Self::default();
        Ok(Self {
            eq: base.eq.merged(&self.eq.as_update())?,
            compressor: base.compressor.merged(&self.compressor.as_update())?,
            reverb: base.reverb.merged(&self.reverb.as_update())?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_merge_clamps() {
        let eq = EqSettings::default()
            .merged(&EqUpdate {
                low_gain: Some(20.0),
                high_gain: Some(-30.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(eq.low_gain, 12.0);
        assert_eq!(eq.mid_gain, 0.0);
        assert_eq!(eq.high_gain, -12.0);
    }

    #[test]
    fn test_compressor_merge_clamps_every_field() {
        let comp = CompressorSettings::default()
            .merged(&CompressorUpdate {
                enabled: Some(true),
                threshold: Some(-100.0),
                ratio: Some(0.5),
                attack: Some(1.0),
                release: Some(0.0),
                knee: Some(99.0),
                makeup_gain: Some(-3.0),
            })
            .unwrap();
        assert!(comp.enabled);
        assert_eq!(comp.threshold, -60.0);
        assert_eq!(comp.ratio, 1.0);
        assert_eq!(comp.attack, 0.1);
        assert_eq!(comp.release, 0.01);
        assert_eq!(comp.knee, 40.0);
        assert_eq!(comp.makeup_gain, 0.0);
    }

    #[test]
    fn test_reverb_merge_clamps() {
        let reverb = ReverbSettings::default()
            .merged(&ReverbUpdate {
                wet_dry: Some(1.5),
                decay: Some(20.0),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(reverb.wet_dry, 1.0);
        assert_eq!(reverb.decay, 8.0);
        assert!(!reverb.enabled);
    }

    #[test]
    fn test_non_finite_update_is_rejected_whole() {
        let before = EqSettings {
            low_gain: 3.0,
            mid_gain: 1.0,
            high_gain: -3.0,
        };
        let result = before.merged(&EqUpdate {
            low_gain: Some(6.0),
            mid_gain: Some(f32::NAN),
            high_gain: None,
        });
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));

        let result = CompressorSettings::default().merged(&CompressorUpdate {
            ratio: Some(f32::INFINITY),
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_validated_clamps_stored_values() {
        let mut effects = StemEffects::default();
        effects.eq.low_gain = 40.0;
        effects.reverb.decay = 0.0;
        let checked = effects.validated().unwrap();
        assert_eq!(checked.eq.low_gain, 12.0);
        assert_eq!(checked.reverb.decay, 0.1);

        effects.compressor.knee = f32::NAN;
        assert!(effects.validated().is_err());
    }

    #[test]
    fn test_serde_uses_camel_case() {
        let yaml = "eq:\n  lowGain: 2.0\ncompressor:\n  makeupGain: 3.0\nreverb:\n  wetDry: 0.25\n";
        let effects: StemEffects = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(effects.eq.low_gain, 2.0);
        assert_eq!(effects.compressor.makeup_gain, 3.0);
        assert_eq!(effects.compressor.ratio, 1.0);
        assert_eq!(effects.reverb.wet_dry, 0.25);
    }
}
