//! Named effect presets

use std::str::FromStr;

use super::settings::{CompressorSettings, EqSettings, ReverbSettings};
use crate::error::EngineError;

/// EQ presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EqPreset {
    Flat,
    Warm,
    Bright,
    BassBoost,
    VocalPresence,
    Scoop,
}

impl EqPreset {
    pub const ALL: [EqPreset; 6] = [
        EqPreset::Flat,
        EqPreset::Warm,
        EqPreset::Bright,
        EqPreset::BassBoost,
        EqPreset::VocalPresence,
        EqPreset::Scoop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            EqPreset::Flat => "flat",
            EqPreset::Warm => "warm",
            EqPreset::Bright => "bright",
            EqPreset::BassBoost => "bass_boost",
            EqPreset::VocalPresence => "vocal_presence",
            EqPreset::Scoop => "scoop",
        }
    }

    /// Band gains (low, mid, high) in dB
    pub fn settings(&self) -> EqSettings {
        let (low_gain, mid_gain, high_gain) = match self {
            EqPreset::Flat => (0.0, 0.0, 0.0),
            EqPreset::Warm => (3.0, 1.0, -3.0),
            EqPreset::Bright => (-2.0, 0.0, 4.0),
            EqPreset::BassBoost => (6.0, 0.0, -1.0),
            EqPreset::VocalPresence => (-1.0, 4.0, 2.0),
            EqPreset::Scoop => (3.0, -6.0, 3.0),
        };
        EqSettings {
            low_gain,
            mid_gain,
            high_gain,
        }
    }
}

/// Compressor presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressorPreset {
    Off,
    Gentle,
    Moderate,
    Heavy,
    Vocals,
    Drums,
}

impl CompressorPreset {
    pub const ALL: [CompressorPreset; 6] = [
        CompressorPreset::Off,
        CompressorPreset::Gentle,
        CompressorPreset::Moderate,
        CompressorPreset::Heavy,
        CompressorPreset::Vocals,
        CompressorPreset::Drums,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            CompressorPreset::Off => "off",
            CompressorPreset::Gentle => "gentle",
            CompressorPreset::Moderate => "moderate",
            CompressorPreset::Heavy => "heavy",
            CompressorPreset::Vocals => "vocals",
            CompressorPreset::Drums => "drums",
        }
    }

    pub fn settings(&self) -> CompressorSettings {
        // (threshold, ratio, attack, release, knee, enabled)
        let (threshold, ratio, attack, release, knee, enabled) = match self {
            CompressorPreset::Off => (0.0, 1.0, 0.003, 0.25, 0.0, false),
            CompressorPreset::Gentle => (-18.0, 2.0, 0.01, 0.2, 6.0, true),
            CompressorPreset::Moderate => (-24.0, 4.0, 0.008, 0.15, 8.0, true),
            CompressorPreset::Heavy => (-30.0, 8.0, 0.003, 0.1, 4.0, true),
            CompressorPreset::Vocals => (-20.0, 3.0, 0.005, 0.2, 10.0, true),
            CompressorPreset::Drums => (-16.0, 6.0, 0.001, 0.08, 2.0, true),
        };
        CompressorSettings {
            enabled,
            threshold,
            ratio,
            attack,
            release,
            knee,
            makeup_gain: 0.0,
        }
    }
}

/// Reverb presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReverbPreset {
    Off,
    Room,
    Hall,
    Plate,
    Ambient,
}

impl ReverbPreset {
    pub const ALL: [ReverbPreset; 5] = [
        ReverbPreset::Off,
        ReverbPreset::Room,
        ReverbPreset::Hall,
        ReverbPreset::Plate,
        ReverbPreset::Ambient,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ReverbPreset::Off => "off",
            ReverbPreset::Room => "room",
            ReverbPreset::Hall => "hall",
            ReverbPreset::Plate => "plate",
            ReverbPreset::Ambient => "ambient",
        }
    }

    pub fn settings(&self) -> ReverbSettings {
        let (wet_dry, decay, enabled) = match self {
            ReverbPreset::Off => (0.0, 0.1, false),
            ReverbPreset::Room => (0.2, 1.2, true),
            ReverbPreset::Hall => (0.35, 3.0, true),
            ReverbPreset::Plate => (0.3, 1.8, true),
            ReverbPreset::Ambient => (0.5, 6.0, true),
        };
        ReverbSettings {
            enabled,
            wet_dry,
            decay,
        }
    }
}

macro_rules! impl_preset_from_str {
    ($preset:ty, $kind:literal) => {
        impl FromStr for $preset {
            type Err = EngineError;

            fn from_str(name: &str) -> Result<Self, Self::Err> {
                Self::ALL
                    .iter()
                    .copied()
                    .find(|p| p.name() == name)
                    .ok_or_else(|| EngineError::invalid(format!("unknown {} preset '{}'", $kind, name)))
            }
        }
    };
}

impl_preset_from_str!(EqPreset, "EQ");
impl_preset_from_str!(CompressorPreset, "compressor");
impl_preset_from_str!(ReverbPreset, "reverb");
