//! Stem Core - synchronized multi-stem playback with per-stem effects
//!
//! A track is delivered as several stems (vocals, drums, bass, ...) that play
//! in lockstep. [`PlaybackEngine`] owns one source and one effects chain per
//! stem, derives a single playback time from all of them and keeps them
//! aligned, and mixes them through solo/mute rules into a master bus.

pub mod clock;
pub mod config;
pub mod effect;
pub mod engine;
pub mod error;
pub mod export;
pub mod mix;
pub mod source;
pub mod types;

#[cfg(test)]
mod testing;

pub use engine::PlaybackEngine;
pub use error::{EngineError, EngineResult};
pub use types::*;
