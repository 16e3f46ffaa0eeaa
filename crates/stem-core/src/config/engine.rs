//! Engine tuning configuration

use serde::{Deserialize, Serialize};

use crate::types::DEFAULT_SAMPLE_RATE;

/// Engine configuration
///
/// Every field has a default, so a partial YAML file only overrides what it
/// names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Render sample rate in Hz
    /// Sources whose file rate differs are resampled to this rate.
    /// Default: 48000
    pub sample_rate: u32,

    /// Frames rendered per `process` call by the offline renderer
    /// Default: 512
    pub block_size: usize,

    /// A source further than this from the mean position is snapped back
    /// Default: 0.1 s
    pub drift_threshold_secs: f64,

    /// A source this close to its own end counts as ended once another
    /// source has ended
    /// Default: 0.05 s
    pub end_tolerance_secs: f64,

    /// Time constant of the one-pole gain smoothing
    /// Default: 0.01 s
    pub smoothing_secs: f32,

    /// Suggested polling interval for gain reduction meters
    /// The engine never polls itself; hosts read this to pace their UI.
    /// Default: 50 ms
    pub meter_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            block_size: 512,
            drift_threshold_secs: 0.1,
            end_tolerance_secs: 0.05,
            smoothing_secs: 0.01,
            meter_interval_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Return a copy with out-of-range values replaced by safe ones
    ///
    /// Zero rates and block sizes would stall the renderer; negative
    /// thresholds would make every tick correct drift.
    pub fn sanitized(&self) -> Self {
        let defaults = Self::default();
        let finite_or = |v: f64, fallback: f64| if v.is_finite() && v >= 0.0 { v } else { fallback };
        Self {
            sample_rate: if self.sample_rate == 0 {
                defaults.sample_rate
            } else {
                self.sample_rate
            },
            block_size: self.block_size.max(1),
            drift_threshold_secs: finite_or(self.drift_threshold_secs, defaults.drift_threshold_secs),
            end_tolerance_secs: finite_or(self.end_tolerance_secs, defaults.end_tolerance_secs),
            smoothing_secs: if self.smoothing_secs.is_finite() && self.smoothing_secs >= 0.0 {
                self.smoothing_secs
            } else {
                defaults.smoothing_secs
            },
            meter_interval_ms: self.meter_interval_ms.max(1),
        }
    }
}
