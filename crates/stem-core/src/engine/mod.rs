//! Playback engine - sources, clock, mix state and effects in one owner
//!
//! - [`PlaybackEngine`]: session lifecycle, transport, mix and effects commands
//! - [`MixerPreset`]: serializable mixer snapshot
//! - [`EngineState`]: read-only view for the UI

mod engine;
mod preset;
mod slot;
mod state;

pub use engine::PlaybackEngine;
pub use preset::{MixerPreset, StemPreset};
pub use state::{ContextState, EngineState, SourceEvent, StemView, TickReport};
