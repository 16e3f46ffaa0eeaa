//! Effect system - processors, settings and the per-stem chain
//!
//! Every processor implements [`Effect`] and works in place on a
//! [`StereoBuffer`]. [`EffectsChain`] wires them in a fixed order and owns the
//! settings values the UI reads back.

mod chain;
mod compressor;
mod eq;
mod gain;
mod presets;
mod reverb;
mod settings;

pub use chain::EffectsChain;
pub use compressor::{Compressor, ReductionMeter};
pub use eq::{ThreeBandEq, EQ_HIGH_FREQ, EQ_LOW_FREQ, EQ_MID_FREQ, EQ_MID_Q};
pub use gain::GainStage;
pub use presets::{CompressorPreset, EqPreset, ReverbPreset};
pub use reverb::Reverb;
pub use settings::*;

use crate::types::StereoBuffer;

/// The core effect trait - implemented by every processor in the chain
pub trait Effect: Send {
    /// Process a stereo buffer in place
    ///
    /// Must not allocate, block or fail: this runs on the render path.
    fn process(&mut self, buffer: &mut StereoBuffer);

    /// Clear internal DSP state (delay lines, envelopes), keeping settings
    fn reset(&mut self);
}
