//! Mix state - per-stem mute/solo/volume plus the master bus
//!
//! Pure state with no I/O. The audibility rule:
//!
//! ```text
//! has_solo   = any stem soloed
//! audible    = (!has_solo || stem.solo) && !stem.muted && !master.muted
//! effective  = audible ? stem.volume * master.volume : 0
//! ```
//!
//! Solo never touches a stem's own `muted` or `volume`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::types::StemId;

/// Mix controls for one stem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelMix {
    pub muted: bool,
    pub solo: bool,
    /// 0.0..=1.0
    pub volume: f32,
}

impl Default for ChannelMix {
    fn default() -> Self {
        Self {
            muted: false,
            solo: false,
            volume: 1.0,
        }
    }
}

/// Master bus controls
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MasterMix {
    pub muted: bool,
    /// 0.0..=1.0
    pub volume: f32,
}

impl Default for MasterMix {
    fn default() -> Self {
        Self {
            muted: false,
            volume: 1.0,
        }
    }
}

/// Validate and clamp a volume to 0.0..=1.0
pub(crate) fn checked_volume(volume: f32) -> EngineResult<f32> {
    if volume.is_finite() {
        Ok(volume.clamp(0.0, 1.0))
    } else {
        Err(EngineError::invalid(format!("volume must be finite, got {}", volume)))
    }
}

/// Mute/solo/volume state for every stem of a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MixState {
    channels: BTreeMap<StemId, ChannelMix>,
    master: MasterMix,
}

impl MixState {
    /// Fresh state (unity volume, nothing muted or soloed) for these stems
    pub fn new<'a>(ids: impl IntoIterator<Item = &'a StemId>) -> Self {
        Self {
            channels: ids.into_iter().map(|id| (id.clone(), ChannelMix::default())).collect(),
            master: MasterMix::default(),
        }
    }

    pub fn channel(&self, id: &StemId) -> Option<&ChannelMix> {
        self.channels.get(id)
    }

    pub fn master(&self) -> &MasterMix {
        &self.master
    }

    pub fn channels(&self) -> impl Iterator<Item = (&StemId, &ChannelMix)> {
        self.channels.iter()
    }

    fn channel_mut(&mut self, id: &StemId) -> EngineResult<&mut ChannelMix> {
        self.channels
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownStem(id.clone()))
    }

    pub fn set_volume(&mut self, id: &StemId, volume: f32) -> EngineResult<()> {
        let volume = checked_volume(volume)?;
        self.channel_mut(id)?.volume = volume;
        Ok(())
    }

    pub fn set_muted(&mut self, id: &StemId, muted: bool) -> EngineResult<()> {
        self.channel_mut(id)?.muted = muted;
        Ok(())
    }

    pub fn set_solo(&mut self, id: &StemId, solo: bool) -> EngineResult<()> {
        self.channel_mut(id)?.solo = solo;
        Ok(())
    }

    /// Flip mute, returning the new state
    pub fn toggle_muted(&mut self, id: &StemId) -> EngineResult<bool> {
        let channel = self.channel_mut(id)?;
        channel.muted = !channel.muted;
        Ok(channel.muted)
    }

    /// Flip solo, returning the new state
    pub fn toggle_solo(&mut self, id: &StemId) -> EngineResult<bool> {
        let channel = self.channel_mut(id)?;
        channel.solo = !channel.solo;
        Ok(channel.solo)
    }

    /// Replace one stem's controls (volume is validated)
    pub fn set_channel(&mut self, id: &StemId, mix: ChannelMix) -> EngineResult<()> {
        let volume = checked_volume(mix.volume)?;
        *self.channel_mut(id)? = ChannelMix { volume, ..mix };
        Ok(())
    }

    pub fn set_master_volume(&mut self, volume: f32) -> EngineResult<()> {
        self.master.volume = checked_volume(volume)?;
        Ok(())
    }

    pub fn set_master_muted(&mut self, muted: bool) {
        self.master.muted = muted;
    }

    /// Whether any stem is soloed
    pub fn has_solo_active(&self) -> bool {
        self.channels.values().any(|c| c.solo)
    }

    fn audible(&self, channel: &ChannelMix, has_solo: bool) -> bool {
        (!has_solo || channel.solo) && !channel.muted && !self.master.muted
    }

    /// Whether a stem reaches the master bus (unknown stems are not)
    pub fn is_audible(&self, id: &StemId) -> bool {
        self.channels
            .get(id)
            .map(|c| self.audible(c, self.has_solo_active()))
            .unwrap_or(false)
    }

    /// Gain applied to a stem on its way to the master bus
    pub fn effective_volume(&self, id: &StemId) -> f32 {
        let has_solo = self.has_solo_active();
        self.channels
            .get(id)
            .filter(|c| self.audible(c, has_solo))
            .map(|c| c.volume * self.master.volume)
            .unwrap_or(0.0)
    }
}
