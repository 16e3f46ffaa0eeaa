//! Mixer preset snapshots
//!
//! The shape exchanged with the preset store: master volume plus, per stem,
//! volume, mute, solo and the full effect settings. Storage itself is the
//! host's concern.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::effect::StemEffects;
use crate::mix::ChannelMix;
use crate::types::StemId;

/// One stem's saved mix and effects
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StemPreset {
    pub volume: f32,
    #[serde(default)]
    pub muted: bool,
    #[serde(default)]
    pub solo: bool,
    #[serde(default)]
    pub effects: StemEffects,
}

impl StemPreset {
    pub fn mix(&self) -> ChannelMix {
        ChannelMix {
            muted: self.muted,
            solo: self.solo,
            volume: self.volume,
        }
    }
}

impl Default for StemPreset {
    fn default() -> Self {
        Self {
            volume: 1.0,
            muted: false,
            solo: false,
            effects: StemEffects::default(),
        }
    }
}

/// Complete mixer snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MixerPreset {
    pub master_volume: f32,
    #[serde(default)]
    pub master_muted: bool,
    #[serde(default)]
    pub stems: BTreeMap<StemId, StemPreset>,
}

impl Default for MixerPreset {
    fn default() -> Self {
        Self {
            master_volume: 1.0,
            master_muted: false,
            stems: BTreeMap::new(),
        }
    }
}
