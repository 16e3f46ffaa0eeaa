//! Per-stem engine slot

use crate::clock::ClockSample;
use crate::effect::{EffectsChain, StemEffects};
use crate::error::TransportError;
use crate::source::{SourceStatus, StartHandle, StemDescriptor, StemSource};
use crate::types::{StemId, StereoBuffer};

/// Everything the engine holds for one stem
pub(crate) struct StemSlot {
    pub descriptor: StemDescriptor,
    pub source: Box<dyn StemSource>,
    /// Last status observed by polling
    pub status: SourceStatus,
    /// Effect settings waiting for the chain to be built
    pub pending_effects: StemEffects,
    pub chain: Option<EffectsChain>,
    /// Start issued while playback was already running, not yet answered
    pub pending_start: Option<StartHandle>,
    /// Transport refused to start; cleared by the next `play`
    pub start_error: Option<TransportError>,
    /// Render scratch buffer
    pub buffer: StereoBuffer,
}

impl StemSlot {
    pub fn new(descriptor: StemDescriptor, source: Box<dyn StemSource>, block_size: usize) -> Self {
        Self {
            descriptor,
            source,
            status: SourceStatus::Loading,
            pending_effects: StemEffects::default(),
            chain: None,
            pending_start: None,
            start_error: None,
            buffer: StereoBuffer::silence(block_size),
        }
    }

    pub fn id(&self) -> &StemId {
        &self.descriptor.id
    }

    pub fn is_ready(&self) -> bool {
        self.status.is_ready()
    }

    /// Ready and confirmed playing along with the rest
    ///
    /// Only active stems are averaged into the clock.
    pub fn is_active(&self) -> bool {
        self.is_ready() && self.pending_start.is_none() && self.start_error.is_none()
    }

    /// Forget any outstanding or failed start
    pub fn clear_start(&mut self) {
        self.pending_start = None;
        self.start_error = None;
    }

    /// Effect settings in force (chain if built, otherwise pending)
    pub fn effects(&self) -> StemEffects {
        self.chain
            .as_ref()
            .map(|c| *c.settings())
            .unwrap_or(self.pending_effects)
    }

    /// Reading for the playback clock
    pub fn clock_sample(&self, index: usize) -> ClockSample {
        let time = self.source.position();
        let remaining = self
            .source
            .duration()
            .map(|d| (d - time).max(0.0))
            .unwrap_or(f64::INFINITY);
        ClockSample::new(index, time, self.source.has_ended(), remaining)
    }

    /// Render one block: source, then the chain when routed through it
    ///
    /// A chained stem is silent while the render context is suspended.
    pub fn render(&mut self, frames: usize, context_running: bool) {
        self.buffer.set_len(frames);
        self.source.render(&mut self.buffer);
        if let Some(chain) = &mut self.chain {
            if context_running {
                chain.process(&mut self.buffer);
            } else {
                self.buffer.fill_silence();
            }
        }
    }
}
