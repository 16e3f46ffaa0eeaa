//! Read-only views of the engine for the UI

use crate::clock::DriftCorrection;
use crate::effect::StemEffects;
use crate::error::{SourceLoadError, TransportError};
use crate::mix::{ChannelMix, MasterMix};
use crate::source::SourceStatus;
use crate::types::{StemId, StemKind};

/// Lifecycle of the shared render context
///
/// Starts `Suspended` until a user gesture resumes it. Stems routed through
/// an effects chain are silent while suspended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

/// Snapshot of one stem
#[derive(Debug, Clone, PartialEq)]
pub struct StemView {
    pub id: StemId,
    pub kind: StemKind,
    pub status: SourceStatus,
    pub duration: Option<f64>,
    pub mix: ChannelMix,
    pub audible: bool,
    pub effective_volume: f32,
    /// Settings in force, or held for the chain until effects are enabled
    pub effects: StemEffects,
}

/// Snapshot of the whole engine
#[derive(Debug, Clone, PartialEq)]
pub struct EngineState {
    pub current_time: f64,
    pub duration: f64,
    pub is_playing: bool,
    pub context: ContextState,
    pub effects_enabled: bool,
    pub stems: Vec<StemView>,
    pub master: MasterMix,
}

/// Change in a source's load status
#[derive(Debug, Clone, PartialEq)]
pub enum SourceEvent {
    Ready { id: StemId, duration: f64 },
    Failed { id: StemId, error: SourceLoadError },
    /// A stem that became ready mid-playback could not join; it stays out
    /// of the clock until the next `play`
    StartFailed { id: StemId, error: TransportError },
    /// No stem is loading any more (emitted once per session)
    AllSettled { ready: usize, failed: usize },
}

/// What happened during one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub current_time: f64,
    pub events: Vec<SourceEvent>,
    /// Source snapped back to the mean this tick
    pub correction: Option<(StemId, DriftCorrection)>,
    /// Playback reached the natural end this tick
    pub ended: bool,
}
