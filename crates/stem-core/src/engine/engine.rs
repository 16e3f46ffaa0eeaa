//! Playback engine - ties together sources, clock, mix state and effects
//!
//! One explicitly owned value per render context. The host drives it from
//! two places: its audio callback (or an offline renderer) calls
//! [`PlaybackEngine::process`], and a cooperative timer calls
//! [`PlaybackEngine::tick`] to publish the clock and correct drift.

use rayon::prelude::*;

use super::preset::{MixerPreset, StemPreset};
use super::slot::StemSlot;
use super::state::{ContextState, EngineState, SourceEvent, StemView, TickReport};
use crate::clock::{ClockState, PlaybackClock, TickOutcome};
use crate::config::EngineConfig;
use crate::effect::{
    CompressorUpdate, EffectsChain, EqUpdate, ReductionMeter, ReverbUpdate, StemEffects,
};
use crate::error::{EngineError, EngineResult};
use crate::mix::MixState;
use crate::source::{FileSourceFactory, SourceFactory, SourceStatus, StartHandle, StemDescriptor};
use crate::types::{StemId, StereoBuffer};

/// Multi-stem playback engine
pub struct PlaybackEngine {
    config: EngineConfig,
    factory: Box<dyn SourceFactory>,
    context: ContextState,
    session_loaded: bool,
    slots: Vec<StemSlot>,
    mix: MixState,
    clock: PlaybackClock,
    effects_enabled: bool,
    /// Status changes not yet handed to the host
    events: Vec<SourceEvent>,
    settled_announced: bool,
}

impl PlaybackEngine {
    /// Create an engine that opens stems through `factory`
    pub fn new(config: EngineConfig, factory: impl SourceFactory + 'static) -> Self {
        let config = config.sanitized();
        log::info!(
            "PlaybackEngine created: {} Hz, block size {}",
            config.sample_rate,
            config.block_size
        );
        Self {
            clock: PlaybackClock::from_config(&config),
            config,
            factory: Box::new(factory),
            context: ContextState::Suspended,
            session_loaded: false,
            slots: Vec::new(),
            mix: MixState::default(),
            effects_enabled: false,
            events: Vec::new(),
            settled_announced: false,
        }
    }

    /// Create an engine that loads WAV stems from disk
    pub fn with_file_sources(config: EngineConfig) -> Self {
        Self::new(config, FileSourceFactory::new())
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn context_state(&self) -> ContextState {
        self.context
    }

    pub fn effects_enabled(&self) -> bool {
        self.effects_enabled
    }

    pub fn is_playing(&self) -> bool {
        self.clock.is_playing()
    }

    pub fn current_time(&self) -> f64 {
        self.clock.current_time()
    }

    pub fn mix(&self) -> &MixState {
        &self.mix
    }

    /// Longest duration among ready stems (0 when none is ready)
    pub fn duration(&self) -> f64 {
        self.slots
            .iter()
            .filter(|s| s.is_ready())
            .filter_map(|s| s.source.duration())
            .fold(0.0, f64::max)
    }

    fn ensure_session(&self) -> EngineResult<()> {
        if self.context == ContextState::Closed {
            return Err(EngineError::NotReady("engine has been shut down"));
        }
        if !self.session_loaded {
            return Err(EngineError::NotReady("no session loaded"));
        }
        Ok(())
    }

    fn slot_index(&self, id: &StemId) -> EngineResult<usize> {
        self.slots
            .iter()
            .position(|s| s.id() == id)
            .ok_or_else(|| EngineError::UnknownStem(id.clone()))
    }

    // ---- session ---------------------------------------------------------

    /// Replace the session with a new ordered stem list
    ///
    /// Releases the previous sources and resets the mix, the clock and the
    /// effects routing. Duplicate ids reject the whole list.
    pub fn load_session(&mut self, stems: Vec<StemDescriptor>) -> EngineResult<()> {
        if self.context == ContextState::Closed {
            return Err(EngineError::NotReady("engine has been shut down"));
        }
        for (i, stem) in stems.iter().enumerate() {
            if stems[..i].iter().any(|s| s.id == stem.id) {
                return Err(EngineError::invalid(format!("duplicate stem id '{}'", stem.id)));
            }
        }

        self.release_sources();
        self.clock.reset();
        self.mix = MixState::new(stems.iter().map(|s| &s.id));
        self.effects_enabled = false;
        self.events.clear();
        self.settled_announced = false;

        let (rate, smoothing, block) = (
            self.config.sample_rate,
            self.config.smoothing_secs,
            self.config.block_size,
        );
        self.slots = stems
            .into_iter()
            .map(|descriptor| {
                let source = self.factory.open(&descriptor, rate, smoothing);
                StemSlot::new(descriptor, source, block)
            })
            .collect();
        self.session_loaded = true;

        log::info!("Session loaded with {} stems", self.slots.len());
        self.apply_mix();
        self.refresh_sources();
        Ok(())
    }

    fn release_sources(&mut self) {
        for slot in &mut self.slots {
            slot.source.pause();
            slot.source.release();
        }
        self.slots.clear();
    }

    /// Poll every loading source, queueing status events
    fn refresh_sources(&mut self) {
        let clock_time = self.clock.current_time();
        let playing = self.clock.is_playing();

        for slot in &mut self.slots {
            if slot.status != SourceStatus::Loading {
                continue;
            }
            let status = slot.source.poll_status();
            match &status {
                SourceStatus::Loading => {}
                SourceStatus::Ready => {
                    let duration = slot.source.duration().unwrap_or(0.0);
                    self.events.push(SourceEvent::Ready {
                        id: slot.id().clone(),
                        duration,
                    });
                    if playing {
                        // Join playback already in progress
                        slot.source.set_position(clock_time);
                        slot.pending_start = Some(slot.source.start());
                    }
                }
                SourceStatus::Failed(error) => {
                    log::warn!("Stem '{}' excluded from playback: {}", slot.id(), error);
                    self.events.push(SourceEvent::Failed {
                        id: slot.id().clone(),
                        error: error.clone(),
                    });
                }
            }
            slot.status = status;
        }

        for slot in &mut self.slots {
            let Some(handle) = &mut slot.pending_start else {
                continue;
            };
            match handle.poll() {
                None => {}
                Some(Ok(())) => slot.pending_start = None,
                Some(Err(error)) => {
                    slot.pending_start = None;
                    slot.source.pause();
                    log::warn!("Stem '{}' could not join playback: {}", slot.id(), error);
                    self.events.push(SourceEvent::StartFailed {
                        id: slot.id().clone(),
                        error: error.clone(),
                    });
                    slot.start_error = Some(error);
                }
            }
        }

        if self.session_loaded
            && !self.settled_announced
            && self.slots.iter().all(|s| s.status != SourceStatus::Loading)
        {
            let ready = self.slots.iter().filter(|s| s.is_ready()).count();
            let failed = self.slots.len() - ready;
            log::info!("All stems settled: {} ready, {} failed", ready, failed);
            self.events.push(SourceEvent::AllSettled { ready, failed });
            self.settled_announced = true;
        }
    }

    /// Poll sources and return status changes since the last call
    pub fn poll_sources(&mut self) -> Vec<SourceEvent> {
        self.refresh_sources();
        std::mem::take(&mut self.events)
    }

    /// Whether any stem is still loading
    pub fn is_loading(&self) -> bool {
        self.slots.iter().any(|s| s.status == SourceStatus::Loading)
    }

    /// Fail unless every stem loaded
    ///
    /// Returns the first failed stem's error, or `NotReady` while loading.
    pub fn require_all_loaded(&self) -> EngineResult<()> {
        self.ensure_session()?;
        for slot in &self.slots {
            match &slot.status {
                SourceStatus::Ready => {}
                SourceStatus::Loading => return Err(EngineError::NotReady("stems are still loading")),
                SourceStatus::Failed(error) => {
                    return Err(EngineError::SourceLoad {
                        stem: slot.id().clone(),
                        source: error.clone(),
                    })
                }
            }
        }
        Ok(())
    }

    // ---- render context --------------------------------------------------

    /// Resume the render context (user gesture hook)
    pub fn resume_context(&mut self) -> EngineResult<()> {
        match self.context {
            ContextState::Closed => Err(EngineError::NotReady("engine has been shut down")),
            ContextState::Running => Ok(()),
            ContextState::Suspended => {
                self.context = ContextState::Running;
                log::info!("Render context resumed");
                Ok(())
            }
        }
    }

    /// Route every stem through an effects chain
    ///
    /// Idempotent. Resumes the context, builds missing chains and switches
    /// the volume routing for every loaded stem before returning.
    pub fn enable_effects(&mut self) -> EngineResult<()> {
        self.ensure_session()?;
        self.resume_context()?;

        let (rate, smoothing) = (self.config.sample_rate, self.config.smoothing_secs);
        let mut built = 0;
        for slot in &mut self.slots {
            if slot.chain.is_none() {
                let mut chain = EffectsChain::new(rate, smoothing);
                chain.set_settings(slot.pending_effects);
                chain.snap_gain(self.mix.effective_volume(slot.id()));
                // Source and chain switch together
                slot.source.snap_volume(1.0);
                slot.chain = Some(chain);
                built += 1;
            }
        }

        if !self.effects_enabled {
            log::info!("Effects enabled ({} chains built)", built);
        }
        self.effects_enabled = true;
        self.apply_mix();
        Ok(())
    }

    /// Push effective volumes to wherever each stem's gain lives
    ///
    /// Without effects the source carries the volume. With a chain the
    /// source is held at unity and the chain's gain stage carries it.
    fn apply_mix(&mut self) {
        for slot in &mut self.slots {
            let effective = self.mix.effective_volume(&slot.descriptor.id);
            match &mut slot.chain {
                Some(chain) if self.effects_enabled => {
                    slot.source.set_volume(1.0);
                    chain.set_gain(effective);
                }
                _ => slot.source.set_volume(effective),
            }
        }
    }

    // ---- transport -------------------------------------------------------

    fn pause_sources(&mut self) {
        for slot in &mut self.slots {
            slot.source.pause();
            slot.pending_start = None;
        }
    }

    /// Drop effect tails left from the previous position
    fn flush_chains(&mut self) {
        for chain in self.slots.iter_mut().filter_map(|s| s.chain.as_mut()) {
            chain.flush();
        }
    }

    /// Start every ready stem from the published time
    ///
    /// All starts are issued before any acknowledgement is awaited. If any
    /// source fails to start, every source is paused and the error names
    /// the first stem that failed.
    pub async fn play(&mut self) -> EngineResult<()> {
        self.ensure_session()?;
        self.refresh_sources();
        if self.clock.is_playing() {
            return Ok(());
        }

        let ready: Vec<usize> = (0..self.slots.len()).filter(|&i| self.slots[i].is_ready()).collect();
        if ready.is_empty() {
            return Err(EngineError::NotReady("no stem is ready to play"));
        }

        let start_time = self.clock.current_time();
        for &i in &ready {
            self.slots[i].clear_start();
            self.slots[i].source.set_position(start_time);
        }

        let handles: Vec<(usize, StartHandle)> = ready
            .iter()
            .map(|&i| (i, self.slots[i].source.start()))
            .collect();

        let mut failure = None;
        for (i, handle) in handles {
            if let Err(e) = handle.wait().await {
                if failure.is_none() {
                    failure = Some((i, e));
                }
            }
        }

        if let Some((i, error)) = failure {
            self.pause_sources();
            self.clock.stop();
            let stem = self.slots[i].id().clone();
            log::error!("Playback failed to start: stem '{}': {}", stem, error);
            return Err(EngineError::TransportStart { stem, source: error });
        }

        self.clock.start();
        log::info!("Playback started at {:.3}s ({} stems)", start_time, ready.len());
        Ok(())
    }

    /// Pause every source; the published time stays where it is
    pub fn pause(&mut self) -> EngineResult<()> {
        self.ensure_session()?;
        self.pause_sources();
        self.clock.stop();
        log::debug!("Playback paused at {:.3}s", self.clock.current_time());
        Ok(())
    }

    /// Pause and return everything to 0
    pub fn stop(&mut self) -> EngineResult<()> {
        self.ensure_session()?;
        self.pause_sources();
        for slot in &mut self.slots {
            slot.source.set_position(0.0);
        }
        self.flush_chains();
        self.clock.reset();
        log::debug!("Playback stopped");
        Ok(())
    }

    pub async fn toggle_play_pause(&mut self) -> EngineResult<()> {
        if self.clock.is_playing() {
            self.pause()
        } else {
            self.play().await
        }
    }

    /// Move every source to `time` (clamped to the session duration)
    ///
    /// Playing sources are paused first and resumed once all of them have
    /// been repositioned.
    pub async fn seek(&mut self, time: f64) -> EngineResult<()> {
        self.ensure_session()?;
        if !time.is_finite() {
            return Err(EngineError::invalid(format!("seek time must be finite, got {}", time)));
        }

        let target = time.clamp(0.0, self.duration());
        let was_playing = self.clock.begin_seek(target);
        if was_playing {
            self.pause_sources();
        }
        for slot in &mut self.slots {
            slot.source.set_position(target);
        }
        self.flush_chains();
        self.clock.finish_seek(false);
        log::debug!("Seek to {:.3}s", target);

        if was_playing {
            self.play().await
        } else {
            Ok(())
        }
    }

    /// Poll sources, reconcile the clock and apply drift correction
    pub fn tick(&mut self) -> TickReport {
        self.refresh_sources();
        let mut report = TickReport {
            events: std::mem::take(&mut self.events),
            ..TickReport::default()
        };

        if self.clock.state() == ClockState::Playing {
            let samples: Vec<_> = self
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.is_active())
                .map(|(i, s)| s.clock_sample(i))
                .collect();

            match self.clock.reconcile(&samples) {
                TickOutcome::Advanced { correction: Some(c), .. } => {
                    let slot = &mut self.slots[c.index];
                    log::debug!(
                        "Drift correction: stem '{}' off by {:.3}s, snapping to {:.3}s",
                        slot.id(),
                        c.drift,
                        c.target
                    );
                    slot.source.set_position(c.target);
                    report.correction = Some((slot.id().clone(), c));
                }
                TickOutcome::Ended => {
                    self.pause_sources();
                    for slot in &mut self.slots {
                        slot.source.set_position(0.0);
                    }
                    self.flush_chains();
                    log::info!("Playback reached the end");
                    report.ended = true;
                }
                TickOutcome::Advanced { correction: None, .. } | TickOutcome::Idle => {}
            }
        }

        report.current_time = self.clock.current_time();
        report
    }

    /// Render one block into `out` (its length sets the block size)
    ///
    /// Never fails: unready or paused stems contribute silence. Stems are
    /// rendered in parallel, then summed into the master bus.
    pub fn process(&mut self, out: &mut StereoBuffer) {
        out.fill_silence();
        if self.context == ContextState::Closed {
            return;
        }

        let frames = out.len();
        let running = self.context == ContextState::Running;

        self.slots
            .par_iter_mut()
            .for_each(|slot| slot.render(frames, running));

        for slot in &self.slots {
            out.add_buffer(&slot.buffer);
        }
    }

    // ---- mix -------------------------------------------------------------

    pub fn set_stem_volume(&mut self, id: &StemId, volume: f32) -> EngineResult<()> {
        self.ensure_session()?;
        self.mix.set_volume(id, volume)?;
        self.apply_mix();
        Ok(())
    }

    pub fn set_stem_muted(&mut self, id: &StemId, muted: bool) -> EngineResult<()> {
        self.ensure_session()?;
        self.mix.set_muted(id, muted)?;
        self.apply_mix();
        Ok(())
    }

    pub fn set_stem_solo(&mut self, id: &StemId, solo: bool) -> EngineResult<()> {
        self.ensure_session()?;
        self.mix.set_solo(id, solo)?;
        self.apply_mix();
        Ok(())
    }

    /// Flip a stem's mute, returning the new state
    pub fn toggle_stem_mute(&mut self, id: &StemId) -> EngineResult<bool> {
        self.ensure_session()?;
        let muted = self.mix.toggle_muted(id)?;
        self.apply_mix();
        Ok(muted)
    }

    /// Flip a stem's solo, returning the new state
    pub fn toggle_stem_solo(&mut self, id: &StemId) -> EngineResult<bool> {
        self.ensure_session()?;
        let solo = self.mix.toggle_solo(id)?;
        self.apply_mix();
        Ok(solo)
    }

    pub fn set_master_volume(&mut self, volume: f32) -> EngineResult<()> {
        self.ensure_session()?;
        self.mix.set_master_volume(volume)?;
        self.apply_mix();
        Ok(())
    }

    pub fn set_master_muted(&mut self, muted: bool) -> EngineResult<()> {
        self.ensure_session()?;
        self.mix.set_master_muted(muted);
        self.apply_mix();
        Ok(())
    }

    // ---- effects ---------------------------------------------------------

    fn chain_mut(&mut self, id: &StemId) -> EngineResult<&mut EffectsChain> {
        self.ensure_session()?;
        let index = self.slot_index(id)?;
        if !self.effects_enabled {
            return Err(EngineError::NotReady("effects are not enabled"));
        }
        self.slots[index]
            .chain
            .as_mut()
            .ok_or(EngineError::NotReady("effects are not enabled"))
    }

    pub fn update_eq(&mut self, id: &StemId, update: &EqUpdate) -> EngineResult<()> {
        self.chain_mut(id)?.update_eq(update)
    }

    pub fn apply_eq_preset(&mut self, id: &StemId, name: &str) -> EngineResult<()> {
        self.chain_mut(id)?.apply_eq_preset(name)
    }

    pub fn update_compressor(&mut self, id: &StemId, update: &CompressorUpdate) -> EngineResult<()> {
        self.chain_mut(id)?.update_compressor(update)
    }

    pub fn apply_compressor_preset(&mut self, id: &StemId, name: &str) -> EngineResult<()> {
        self.chain_mut(id)?.apply_compressor_preset(name)
    }

    pub fn update_reverb(&mut self, id: &StemId, update: &ReverbUpdate) -> EngineResult<()> {
        self.chain_mut(id)?.update_reverb(update)
    }

    pub fn apply_reverb_preset(&mut self, id: &StemId, name: &str) -> EngineResult<()> {
        self.chain_mut(id)?.apply_reverb_preset(name)
    }

    /// Restore a stem's effects to the defaults
    pub fn reset_effects(&mut self, id: &StemId) -> EngineResult<()> {
        self.chain_mut(id)?.reset();
        Ok(())
    }

    /// Effect settings currently in force for a stem
    pub fn stem_effects(&self, id: &StemId) -> EngineResult<StemEffects> {
        self.ensure_session()?;
        Ok(self.slots[self.slot_index(id)?].effects())
    }

    /// Instantaneous compressor gain reduction in dB (<= 0)
    ///
    /// Reads 0 for a stem that has no chain yet.
    pub fn compressor_reduction(&self, id: &StemId) -> EngineResult<f32> {
        self.ensure_session()?;
        let slot = &self.slots[self.slot_index(id)?];
        Ok(slot.chain.as_ref().map(|c| c.compressor_reduction()).unwrap_or(0.0))
    }

    /// Meter handle for polling a stem's gain reduction from another thread
    pub fn reduction_meter(&mut self, id: &StemId) -> EngineResult<ReductionMeter> {
        Ok(self.chain_mut(id)?.reduction_meter())
    }

    // ---- presets & state -------------------------------------------------

    /// Restore a mixer snapshot
    ///
    /// The whole preset is validated before anything changes. Stems not in
    /// the session are skipped with a warning; session stems missing from
    /// the preset keep their current settings.
    pub fn load_preset(&mut self, preset: &MixerPreset) -> EngineResult<()> {
        self.ensure_session()?;

        let mut mix = self.mix.clone();
        mix.set_master_volume(preset.master_volume)?;
        mix.set_master_muted(preset.master_muted);

        let mut effects = Vec::with_capacity(preset.stems.len());
        for (id, stem) in &preset.stems {
            let Ok(index) = self.slot_index(id) else {
                log::warn!("Preset names unknown stem '{}', skipping", id);
                continue;
            };
            mix.set_channel(id, stem.mix())?;
            effects.push((index, stem.effects.validated()?));
        }

        self.mix = mix;
        for (index, settings) in effects {
            let slot = &mut self.slots[index];
            match &mut slot.chain {
                Some(chain) => chain.set_settings(settings),
                None => slot.pending_effects = settings,
            }
        }
        self.apply_mix();
        log::info!("Mixer preset loaded ({} stems)", preset.stems.len());
        Ok(())
    }

    /// Capture the current mix and effects as a preset
    pub fn snapshot_preset(&self) -> EngineResult<MixerPreset> {
        self.ensure_session()?;
        let master = self.mix.master();
        let stems = self
            .slots
            .iter()
            .filter_map(|slot| {
                let mix = self.mix.channel(slot.id())?;
                Some((
                    slot.id().clone(),
                    StemPreset {
                        volume: mix.volume,
                        muted: mix.muted,
                        solo: mix.solo,
                        effects: slot.effects(),
                    },
                ))
            })
            .collect();
        Ok(MixerPreset {
            master_volume: master.volume,
            master_muted: master.muted,
            stems,
        })
    }

    /// Snapshot for the UI
    pub fn state(&self) -> EngineState {
        let stems = self
            .slots
            .iter()
            .map(|slot| {
                let id = slot.id();
                StemView {
                    id: id.clone(),
                    kind: slot.descriptor.kind.clone(),
                    status: slot.status.clone(),
                    duration: slot.source.duration(),
                    mix: self.mix.channel(id).copied().unwrap_or_default(),
                    audible: self.mix.is_audible(id),
                    effective_volume: self.mix.effective_volume(id),
                    effects: slot.effects(),
                }
            })
            .collect();

        EngineState {
            current_time: self.clock.current_time(),
            duration: self.duration(),
            is_playing: self.clock.is_playing(),
            context: self.context,
            effects_enabled: self.effects_enabled,
            stems,
            master: *self.mix.master(),
        }
    }

    /// Stop playback, release every source and close the render context
    ///
    /// Every later command is rejected with `NotReady`.
    pub fn shutdown(&mut self) {
        if self.context == ContextState::Closed {
            return;
        }
        self.release_sources();
        self.clock.reset();
        self.session_loaded = false;
        self.context = ContextState::Closed;
        log::info!("PlaybackEngine shut down");
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::{CompressorPreset, CompressorSettings, EqSettings};
    use crate::error::TransportError;
    use crate::source::{BufferedSource, DecodedAudio, StemSource};
    use crate::testing::{block_on, descriptors, ScriptedFactory, ScriptedState};
    use crate::types::StereoSample;

    fn id(s: &str) -> StemId {
        StemId::from(s)
    }

    fn engine_with(factory: &ScriptedFactory, ids: &[&str]) -> PlaybackEngine {
        let mut engine = PlaybackEngine::new(EngineConfig::default(), factory.clone());
        engine.load_session(descriptors(ids)).unwrap();
        engine
    }

    fn effective(engine: &PlaybackEngine) -> Vec<f32> {
        engine.state().stems.iter().map(|s| s.effective_volume).collect()
    }

    #[test]
    fn test_commands_require_a_session() {
        let mut engine = PlaybackEngine::new(EngineConfig::default(), ScriptedFactory::new());
        assert!(matches!(
            engine.set_stem_volume(&id("a"), 0.5),
            Err(EngineError::NotReady(_))
        ));
        assert!(matches!(block_on(engine.play()), Err(EngineError::NotReady(_))));
        assert!(matches!(engine.enable_effects(), Err(EngineError::NotReady(_))));
    }

    #[test]
    fn test_duplicate_stem_ids_are_rejected() {
        let mut engine = PlaybackEngine::new(EngineConfig::default(), ScriptedFactory::new());
        let err = engine.load_session(descriptors(&["a", "b", "a"])).unwrap_err();
        assert!(matches!(err, EngineError::InvalidParameter(_)));
        assert!(engine.state().stems.is_empty());
    }

    #[test]
    fn test_solo_end_to_end() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a", "b", "c"]);

        engine.set_master_volume(0.8).unwrap();
        assert_eq!(effective(&engine), vec![0.8, 0.8, 0.8]);

        engine.set_stem_solo(&id("b"), true).unwrap();
        assert_eq!(effective(&engine), vec![0.0, 0.8, 0.0]);
        assert_eq!(factory.handle("a").lock().volume, 0.0);
        assert_eq!(factory.handle("b").lock().volume, 0.8);

        assert!(!engine.toggle_stem_solo(&id("b")).unwrap());
        assert_eq!(effective(&engine), vec![0.8, 0.8, 0.8]);
        assert_eq!(factory.handle("c").lock().volume, 0.8);
    }

    #[test]
    fn test_volume_routing_moves_to_chain_when_effects_enabled() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a", "b"]);

        engine.set_stem_volume(&id("a"), 0.5).unwrap();
        assert_eq!(factory.handle("a").lock().volume, 0.5);

        engine.enable_effects().unwrap();
        assert_eq!(engine.context_state(), ContextState::Running);
        assert_eq!(factory.handle("a").lock().volume, 1.0);
        assert_eq!(engine.slots[0].chain.as_ref().unwrap().gain(), 0.5);

        engine.set_stem_volume(&id("a"), 0.25).unwrap();
        engine.set_stem_muted(&id("b"), true).unwrap();
        assert_eq!(factory.handle("a").lock().volume, 1.0);
        assert_eq!(factory.handle("b").lock().volume, 1.0);
        assert_eq!(engine.slots[0].chain.as_ref().unwrap().gain(), 0.25);
        assert_eq!(engine.slots[1].chain.as_ref().unwrap().gain(), 0.0);

        // Idempotent
        engine.enable_effects().unwrap();
        assert_eq!(engine.slots[0].chain.as_ref().unwrap().gain(), 0.25);
    }

    #[test]
    fn test_effect_commands_need_effects_enabled() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a"]);

        let update = EqUpdate {
            low_gain: Some(3.0),
            ..Default::default()
        };
        assert!(matches!(
            engine.update_eq(&id("a"), &update),
            Err(EngineError::NotReady(_))
        ));
        assert_eq!(engine.compressor_reduction(&id("a")).unwrap(), 0.0);

        engine.enable_effects().unwrap();
        engine.update_eq(&id("a"), &update).unwrap();
        engine.apply_compressor_preset(&id("a"), "heavy").unwrap();
        assert_eq!(engine.stem_effects(&id("a")).unwrap().eq.low_gain, 3.0);
        assert!(matches!(
            engine.update_eq(&id("missing"), &update),
            Err(EngineError::UnknownStem(_))
        ));
    }

    #[test]
    fn test_reset_effects_equals_defaults() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a"]);
        engine.enable_effects().unwrap();
        engine.apply_eq_preset(&id("a"), "scoop").unwrap();
        engine.apply_reverb_preset(&id("a"), "hall").unwrap();

        engine.reset_effects(&id("a")).unwrap();
        let once = engine.stem_effects(&id("a")).unwrap();
        engine.reset_effects(&id("a")).unwrap();
        assert_eq!(engine.stem_effects(&id("a")).unwrap(), once);
        assert_eq!(once, StemEffects::default());
        assert_eq!(once.eq, EqSettings::default());
        assert_eq!(once.compressor, CompressorSettings::default());
    }

    #[test]
    fn test_load_events_and_play_skip_failed_stems() {
        let factory = ScriptedFactory::new();
        factory.script("bass", ScriptedState::failed());
        let mut engine = engine_with(&factory, &["vocals", "bass", "drums"]);

        let events = engine.poll_sources();
        assert_eq!(events.len(), 4);
        assert!(matches!(&events[1], SourceEvent::Failed { id, .. } if id.as_str() == "bass"));
        assert_eq!(events[3], SourceEvent::AllSettled { ready: 2, failed: 1 });
        assert!(engine.poll_sources().is_empty());
        assert!(matches!(
            engine.require_all_loaded(),
            Err(EngineError::SourceLoad { .. })
        ));

        block_on(engine.play()).unwrap();
        assert!(engine.is_playing());
        assert!(factory.handle("vocals").lock().playing);
        assert!(factory.handle("drums").lock().playing);
        assert_eq!(factory.handle("bass").lock().starts, 0);
    }

    #[test]
    fn test_play_failure_pauses_every_stem() {
        let factory = ScriptedFactory::new();
        let mut drums = ScriptedState::ready(30.0);
        drums.refuse_start = true;
        factory.script("drums", drums);
        let mut engine = engine_with(&factory, &["vocals", "drums", "bass"]);

        let err = block_on(engine.play()).unwrap_err();
        assert_eq!(
            err,
            EngineError::TransportStart {
                stem: id("drums"),
                source: TransportError::Refused("autoplay blocked".into()),
            }
        );
        assert!(!engine.is_playing());
        for stem in ["vocals", "drums", "bass"] {
            let handle = factory.handle(stem);
            assert_eq!(handle.lock().starts, 1, "{} was not started", stem);
            assert!(!handle.lock().playing, "{} still playing", stem);
        }
    }

    #[test]
    fn test_play_waits_for_a_ready_stem() {
        let factory = ScriptedFactory::new();
        factory.script("a", ScriptedState::loading(10.0));
        let mut engine = engine_with(&factory, &["a"]);

        assert!(matches!(block_on(engine.play()), Err(EngineError::NotReady(_))));
        assert!(engine.is_loading());

        factory.handle("a").lock().status = SourceStatus::Ready;
        let events = engine.poll_sources();
        assert_eq!(
            events,
            vec![
                SourceEvent::Ready { id: id("a"), duration: 10.0 },
                SourceEvent::AllSettled { ready: 1, failed: 0 },
            ]
        );
        block_on(engine.play()).unwrap();
        assert!(engine.is_playing());
    }

    #[test]
    fn test_late_stem_joins_running_playback() {
        let factory = ScriptedFactory::new();
        factory.script("late", ScriptedState::loading(10.0));
        let mut engine = engine_with(&factory, &["early", "late"]);
        block_on(engine.play()).unwrap();
        assert!(!factory.handle("late").lock().playing);

        factory.handle("late").lock().status = SourceStatus::Ready;
        let report = engine.tick();
        assert!(report
            .events
            .contains(&SourceEvent::Ready { id: id("late"), duration: 10.0 }));
        assert!(factory.handle("late").lock().playing);
    }

    #[test]
    fn test_tick_corrects_the_drifting_stem() {
        let factory = ScriptedFactory::new();
        for stem in ["a", "b", "c"] {
            factory.script(stem, ScriptedState::ready(30.0));
        }
        let mut engine = engine_with(&factory, &["a", "b", "c"]);
        block_on(engine.play()).unwrap();

        factory.handle("a").lock().position = 10.05;
        factory.handle("b").lock().position = 10.02;
        factory.handle("c").lock().position = 10.20;

        let report = engine.tick();
        assert!((report.current_time - 10.09).abs() < 1e-9);
        let (stem, correction) = report.correction.unwrap();
        assert_eq!(stem, id("c"));
        assert!((correction.drift - 0.11).abs() < 1e-9);
        assert!((factory.handle("c").lock().position - 10.09).abs() < 1e-9);
        assert_eq!(factory.handle("a").lock().position, 10.05);
    }

    #[test]
    fn test_natural_end_stops_and_rewinds() {
        let factory = ScriptedFactory::new();
        factory.script("a", ScriptedState::ready(2.0));
        factory.script("b", ScriptedState::ready(2.0));
        let mut engine = engine_with(&factory, &["a", "b"]);
        block_on(engine.play()).unwrap();

        {
            let a = factory.handle("a");
            let mut a = a.lock();
            a.position = 2.0;
            a.ended = true;
            a.playing = false;
        }
        factory.handle("b").lock().position = 1.97;

        let report = engine.tick();
        assert!(report.ended);
        assert!(!engine.is_playing());
        assert_eq!(engine.current_time(), 0.0);
        assert_eq!(factory.handle("b").lock().position, 0.0);
        assert!(!factory.handle("b").lock().playing);
    }

    #[test]
    fn test_seek_clamps_to_duration() {
        let factory = ScriptedFactory::new();
        factory.script("short", ScriptedState::ready(10.0));
        factory.script("long", ScriptedState::ready(30.0));
        let mut engine = engine_with(&factory, &["short", "long"]);
        assert_eq!(engine.duration(), 30.0);

        block_on(engine.seek(100.0)).unwrap();
        assert_eq!(engine.current_time(), 30.0);
        assert_eq!(factory.handle("long").lock().position, 30.0);

        block_on(engine.seek(-5.0)).unwrap();
        assert_eq!(engine.current_time(), 0.0);

        assert!(matches!(
            block_on(engine.seek(f64::NAN)),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_seek_while_playing_resumes() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a", "b"]);
        block_on(engine.play()).unwrap();

        block_on(engine.seek(4.0)).unwrap();
        assert!(engine.is_playing());
        assert_eq!(engine.current_time(), 4.0);
        assert_eq!(factory.handle("a").lock().position, 4.0);
        assert_eq!(factory.handle("b").lock().starts, 2);
    }

    #[test]
    fn test_stop_returns_to_zero() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a"]);
        block_on(engine.seek(5.0)).unwrap();
        block_on(engine.toggle_play_pause()).unwrap();
        assert!(engine.is_playing());

        engine.stop().unwrap();
        assert!(!engine.is_playing());
        assert_eq!(engine.current_time(), 0.0);
        assert_eq!(factory.handle("a").lock().position, 0.0);
    }

    #[test]
    fn test_process_sums_audible_stems() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a", "b"]);
        block_on(engine.play()).unwrap();

        let mut out = StereoBuffer::silence(64);
        engine.process(&mut out);
        assert!(out.iter().all(|s| (s.left - 1.0).abs() < 1e-6));

        engine.set_stem_muted(&id("a"), true).unwrap();
        engine.process(&mut out);
        assert!(out.iter().all(|s| (s.left - 0.5).abs() < 1e-6));

        engine.pause().unwrap();
        engine.process(&mut out);
        assert_eq!(out.peak(), 0.0);
    }

    #[test]
    fn test_preset_load_is_atomic() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a", "b"]);
        engine.set_stem_volume(&id("a"), 0.3).unwrap();
        let before = engine.snapshot_preset().unwrap();

        let mut bad = before.clone();
        bad.master_volume = 0.5;
        bad.stems.get_mut(&id("b")).unwrap().effects.eq.low_gain = f32::NAN;
        assert!(engine.load_preset(&bad).is_err());
        assert_eq!(engine.snapshot_preset().unwrap(), before);

        let mut good = before.clone();
        good.master_volume = 0.5;
        good.stems.get_mut(&id("a")).unwrap().solo = true;
        good.stems.insert(id("ghost"), StemPreset::default());
        engine.load_preset(&good).unwrap();
        assert_eq!(effective(&engine), vec![0.15, 0.0]);

        // Effects saved before the chain exists are applied when it is built
        good.stems.get_mut(&id("b")).unwrap().effects.reverb.enabled = true;
        engine.load_preset(&good).unwrap();
        engine.enable_effects().unwrap();
        assert!(engine.stem_effects(&id("b")).unwrap().reverb.enabled);
    }

    #[test]
    fn test_shutdown_releases_and_rejects() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a"]);
        engine.shutdown();

        assert!(factory.handle("a").lock().released);
        assert_eq!(engine.context_state(), ContextState::Closed);
        assert!(matches!(
            engine.set_master_volume(0.5),
            Err(EngineError::NotReady(_))
        ));
        assert!(matches!(
            engine.load_session(descriptors(&["a"])),
            Err(EngineError::NotReady(_))
        ));
    }

    /// Five seconds of constant full-scale audio per stem
    struct FlatFactory;

    impl SourceFactory for FlatFactory {
        fn open(&self, descriptor: &StemDescriptor, sample_rate: u32, smoothing_secs: f32) -> Box<dyn StemSource> {
            let audio = DecodedAudio::new(sample_rate, vec![StereoSample::mono(1.0); sample_rate as usize * 5]);
            Box::new(BufferedSource::from_audio(
                descriptor.id.clone(),
                audio,
                sample_rate,
                smoothing_secs,
            ))
        }
    }

    /// Exactly one of source and chain carries the effective volume
    fn assert_routing(engine: &PlaybackEngine, factory: &ScriptedFactory, case: &str) {
        for slot in &engine.slots {
            let effective = engine.mix().effective_volume(slot.id());
            let source_volume = factory.handle(slot.id().as_str()).lock().volume;
            match &slot.chain {
                Some(chain) => {
                    assert_eq!(source_volume, 1.0, "{}: source '{}' not at unity", case, slot.id());
                    assert_eq!(chain.gain(), effective, "{}: chain gain of '{}'", case, slot.id());
                }
                None => {
                    assert_eq!(source_volume, effective, "{}: source volume of '{}'", case, slot.id())
                }
            }
        }
    }

    #[test]
    fn test_volume_routing_is_exclusive_for_every_mix_change() {
        let cases: &[(&str, fn(&mut PlaybackEngine))] = &[
            ("volume", |e| e.set_stem_volume(&id("a"), 0.4).unwrap()),
            ("mute", |e| e.set_stem_muted(&id("b"), true).unwrap()),
            ("solo self", |e| e.set_stem_solo(&id("a"), true).unwrap()),
            ("solo other", |e| e.set_stem_solo(&id("c"), true).unwrap()),
            ("solo off", |e| {
                e.toggle_stem_solo(&id("c")).unwrap();
            }),
            ("solo muted stem", |e| e.set_stem_solo(&id("b"), true).unwrap()),
            ("unmute", |e| {
                e.toggle_stem_mute(&id("b")).unwrap();
            }),
            ("master volume", |e| e.set_master_volume(0.6).unwrap()),
            ("master mute", |e| e.set_master_muted(true).unwrap()),
            ("master unmute", |e| e.set_master_muted(false).unwrap()),
            ("preset", |e| {
                let mut preset = e.snapshot_preset().unwrap();
                preset.master_volume = 0.9;
                for stem in preset.stems.values_mut() {
                    stem.solo = false;
                    stem.volume = 0.3;
                }
                e.load_preset(&preset).unwrap();
            }),
        ];

        for effects in [false, true] {
            let factory = ScriptedFactory::new();
            let mut engine = engine_with(&factory, &["a", "b", "c"]);
            block_on(engine.play()).unwrap();
            if effects {
                engine.enable_effects().unwrap();
            }
            assert_routing(&engine, &factory, "initial");

            for (case, apply) in cases {
                apply(&mut engine);
                assert_routing(&engine, &factory, case);
            }
        }
    }

    #[test]
    fn test_enabling_effects_mid_playback_keeps_the_level() {
        let mut engine = PlaybackEngine::new(EngineConfig::default(), FlatFactory);
        engine.load_session(descriptors(&["a"])).unwrap();
        engine.set_stem_volume(&id("a"), 0.5).unwrap();
        block_on(engine.play()).unwrap();

        let mut out = StereoBuffer::silence(512);
        engine.process(&mut out);
        assert!(out.iter().all(|s| (s.left - 0.5).abs() < 1e-4));

        engine.enable_effects().unwrap();
        engine.process(&mut out);
        for (i, s) in out.iter().enumerate() {
            assert!((s.left - 0.5).abs() < 1e-4, "frame {} at {}", i, s.left);
        }

        // Later changes ramp on the chain alone
        engine.set_stem_volume(&id("a"), 0.25).unwrap();
        engine.process(&mut out);
        assert!(out.iter().all(|s| s.left <= 0.5 + 1e-4 && s.left >= 0.25 - 1e-4));
    }

    #[test]
    fn test_late_stem_that_cannot_start_is_left_out_of_the_clock() {
        let factory = ScriptedFactory::new();
        factory.script("early", ScriptedState::ready(30.0));
        let mut late = ScriptedState::loading(30.0);
        late.refuse_start = true;
        factory.script("late", late);
        let mut engine = engine_with(&factory, &["early", "late"]);
        block_on(engine.play()).unwrap();

        factory.handle("late").lock().status = SourceStatus::Ready;
        let report = engine.tick();
        assert!(report.events.contains(&SourceEvent::StartFailed {
            id: id("late"),
            error: TransportError::Refused("autoplay blocked".into()),
        }));
        assert!(engine.is_playing());
        assert!(!factory.handle("late").lock().playing);

        factory.handle("early").lock().position = 0.5;
        let report = engine.tick();
        assert_eq!(report.current_time, 0.5);
        assert_eq!(report.correction, None);
        assert_eq!(factory.handle("late").lock().position, 0.0);

        // The next play tries again
        factory.handle("late").lock().refuse_start = false;
        engine.pause().unwrap();
        block_on(engine.play()).unwrap();
        let late = factory.handle("late");
        assert_eq!(late.lock().starts, 2);
        assert!(late.lock().playing);
        assert_eq!(late.lock().position, 0.5);
    }

    #[test]
    fn test_seek_and_natural_end_flush_effect_state() {
        let factory = ScriptedFactory::new();
        factory.script("a", ScriptedState::ready(2.0));
        let mut engine = engine_with(&factory, &["a"]);
        engine.enable_effects().unwrap();
        engine.apply_compressor_preset(&id("a"), CompressorPreset::Heavy.name()).unwrap();
        block_on(engine.play()).unwrap();

        let mut out = StereoBuffer::silence(512);
        engine.process(&mut out);
        assert!(engine.compressor_reduction(&id("a")).unwrap() < -1.0);

        block_on(engine.seek(1.0)).unwrap();
        assert_eq!(engine.compressor_reduction(&id("a")).unwrap(), 0.0);

        engine.process(&mut out);
        assert!(engine.compressor_reduction(&id("a")).unwrap() < -1.0);
        {
            let a = factory.handle("a");
            let mut a = a.lock();
            a.position = 2.0;
            a.ended = true;
            a.playing = false;
        }
        assert!(engine.tick().ended);
        assert_eq!(engine.compressor_reduction(&id("a")).unwrap(), 0.0);
    }

    #[test]
    fn test_state_reports_pending_effects() {
        let factory = ScriptedFactory::new();
        let mut engine = engine_with(&factory, &["a"]);
        let mut preset = engine.snapshot_preset().unwrap();
        preset.stems.get_mut(&id("a")).unwrap().effects.reverb.enabled = true;
        engine.load_preset(&preset).unwrap();

        let view = &engine.state().stems[0];
        assert!(view.effects.reverb.enabled);
        assert_eq!(view.effects, engine.stem_effects(&id("a")).unwrap());
    }
}
