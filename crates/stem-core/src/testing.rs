//! Scripted sources for engine tests
//!
//! Each source's state lives behind a shared handle so a test can flip
//! load status, fake drift or refuse a start after the engine took
//! ownership of the source.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::{SourceLoadError, TransportError};
use crate::source::{SourceFactory, SourceStatus, StartHandle, StemDescriptor, StemSource};
use crate::types::{StemId, StereoBuffer, StereoSample};

#[derive(Debug, Clone)]
pub struct ScriptedState {
    pub status: SourceStatus,
    pub duration: f64,
    pub position: f64,
    pub playing: bool,
    pub ended: bool,
    pub volume: f32,
    /// Constant mono level rendered while playing
    pub level: f32,
    pub refuse_start: bool,
    pub starts: usize,
    pub released: bool,
}

impl ScriptedState {
    pub fn ready(duration: f64) -> Self {
        Self {
            status: SourceStatus::Ready,
            duration,
            position: 0.0,
            playing: false,
            ended: false,
            volume: 1.0,
            level: 0.5,
            refuse_start: false,
            starts: 0,
            released: false,
        }
    }

    pub fn loading(duration: f64) -> Self {
        Self {
            status: SourceStatus::Loading,
            ..Self::ready(duration)
        }
    }

    pub fn failed() -> Self {
        Self {
            status: SourceStatus::Failed(SourceLoadError::Decode {
                uri: "mem://broken".into(),
                reason: "truncated stream".into(),
            }),
            ..Self::ready(0.0)
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptHandle(Arc<Mutex<ScriptedState>>);

impl ScriptHandle {
    pub fn lock(&self) -> MutexGuard<'_, ScriptedState> {
        self.0.lock().unwrap()
    }
}

pub struct ScriptedSource {
    id: StemId,
    sample_rate: u32,
    state: ScriptHandle,
}

impl StemSource for ScriptedSource {
    fn id(&self) -> &StemId {
        &self.id
    }

    fn poll_status(&mut self) -> SourceStatus {
        self.state.lock().status.clone()
    }

    fn duration(&self) -> Option<f64> {
        let state = self.state.lock();
        state.status.is_ready().then_some(state.duration)
    }

    fn position(&self) -> f64 {
        self.state.lock().position
    }

    fn set_position(&mut self, seconds: f64) {
        let mut state = self.state.lock();
        state.position = seconds.clamp(0.0, state.duration);
        state.ended = state.position >= state.duration;
    }

    fn start(&mut self) -> StartHandle {
        let mut state = self.state.lock();
        state.starts += 1;
        if state.refuse_start {
            return StartHandle::ready(Err(TransportError::Refused("autoplay blocked".into())));
        }
        state.playing = true;
        StartHandle::ready(Ok(()))
    }

    fn pause(&mut self) {
        self.state.lock().playing = false;
    }

    fn is_playing(&self) -> bool {
        self.state.lock().playing
    }

    fn has_ended(&self) -> bool {
        self.state.lock().ended
    }

    fn set_volume(&mut self, volume: f32) {
        self.state.lock().volume = volume;
    }

    fn volume(&self) -> f32 {
        self.state.lock().volume
    }

    fn render(&mut self, out: &mut StereoBuffer) {
        let mut state = self.state.lock();
        if !state.playing {
            out.fill_silence();
            return;
        }
        let sample = StereoSample::mono(state.level * state.volume);
        let left = ((state.duration - state.position) * self.sample_rate as f64).round() as usize;
        for (i, frame) in out.iter_mut().enumerate() {
            *frame = if i < left { sample } else { StereoSample::silence() };
        }
        state.position += out.len() as f64 / self.sample_rate as f64;
        if state.position >= state.duration {
            state.position = state.duration;
            state.ended = true;
            state.playing = false;
        }
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.playing = false;
        state.released = true;
    }
}

/// Hands out scripted sources; unscripted ids get a ready 10 s source
#[derive(Debug, Clone, Default)]
pub struct ScriptedFactory {
    scripts: Arc<Mutex<BTreeMap<StemId, ScriptHandle>>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, id: &str, state: ScriptedState) -> ScriptHandle {
        let handle = ScriptHandle(Arc::new(Mutex::new(state)));
        self.scripts
            .lock()
            .unwrap()
            .insert(StemId::from(id), handle.clone());
        handle
    }

    pub fn handle(&self, id: &str) -> ScriptHandle {
        self.scripts.lock().unwrap()[&StemId::from(id)].clone()
    }
}

impl SourceFactory for ScriptedFactory {
    fn open(&self, descriptor: &StemDescriptor, sample_rate: u32, _smoothing_secs: f32) -> Box<dyn StemSource> {
        let state = self
            .scripts
            .lock()
            .unwrap()
            .entry(descriptor.id.clone())
            .or_insert_with(|| ScriptHandle(Arc::new(Mutex::new(ScriptedState::ready(10.0)))))
            .clone();
        Box::new(ScriptedSource {
            id: descriptor.id.clone(),
            sample_rate,
            state,
        })
    }
}

pub fn descriptors(ids: &[&str]) -> Vec<StemDescriptor> {
    ids.iter()
        .map(|id| StemDescriptor::new(*id, Default::default(), format!("mem://{}", id)))
        .collect()
}

/// Run a future to completion on a throwaway runtime
pub fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}
