//! Offline mixdown
//!
//! Renders the current mix from 0 to the natural end (or a time cap) into a
//! 16-bit stereo WAV. Mute, solo, volumes and effects apply exactly as they
//! would during live playback.

mod message;
mod mixdown;

pub use message::MixdownProgress;
pub use mixdown::{render_mixdown, ExportError, MixdownOptions, MixdownReport};
