//! In-memory stem source with background loading

use crossbeam::channel::{Receiver, TryRecvError};

use super::decode::DecodedAudio;
use super::{SourceStatus, StartHandle, StemSource};
use crate::effect::{Effect, GainStage};
use crate::error::{SourceLoadError, TransportError};
use crate::types::{StemId, StereoBuffer, StereoSample};

/// Result delivered by a loader thread
pub(crate) type LoadResult = Result<DecodedAudio, SourceLoadError>;

/// A source that plays fully decoded audio from memory
///
/// The audio arrives over a channel from a loader thread and is picked up
/// by `poll_status`. Playback resamples to the engine rate with linear
/// interpolation, and transport volume is ramped through a [`GainStage`].
pub struct BufferedSource {
    id: StemId,
    uri: String,
    status: SourceStatus,
    pending: Option<Receiver<LoadResult>>,
    audio: Option<DecodedAudio>,
    output_rate: u32,
    /// Playhead in seconds of stream time
    position: f64,
    playing: bool,
    ended: bool,
    gain: GainStage,
}

impl BufferedSource {
    /// A source waiting on a loader
    pub(crate) fn loading(
        id: StemId,
        uri: String,
        pending: Receiver<LoadResult>,
        output_rate: u32,
        smoothing_secs: f32,
    ) -> Self {
        Self {
            id,
            uri,
            status: SourceStatus::Loading,
            pending: Some(pending),
            audio: None,
            output_rate,
            position: 0.0,
            playing: false,
            ended: false,
            gain: GainStage::new(output_rate, smoothing_secs, 1.0),
        }
    }

    /// A source that failed before loading could begin
    pub(crate) fn failed(id: StemId, uri: String, error: SourceLoadError, output_rate: u32) -> Self {
        Self {
            status: SourceStatus::Failed(error),
            pending: None,
            ..Self::from_audio_inner(id, uri, None, output_rate, 0.0)
        }
    }

    /// A source that is ready immediately
    pub fn from_audio(id: StemId, audio: DecodedAudio, output_rate: u32, smoothing_secs: f32) -> Self {
        Self::from_audio_inner(id, String::new(), Some(audio), output_rate, smoothing_secs)
    }

    fn from_audio_inner(
        id: StemId,
        uri: String,
        audio: Option<DecodedAudio>,
        output_rate: u32,
        smoothing_secs: f32,
    ) -> Self {
        let status = if audio.is_some() {
            SourceStatus::Ready
        } else {
            SourceStatus::Loading
        };
        Self {
            id,
            uri,
            status,
            pending: None,
            audio,
            output_rate,
            position: 0.0,
            playing: false,
            ended: false,
            gain: GainStage::new(output_rate, smoothing_secs, 1.0),
        }
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    fn finish_loading(&mut self, result: LoadResult) {
        match result {
            Ok(audio) => {
                log::info!(
                    "Stem '{}' loaded: {:.2}s at {} Hz",
                    self.id,
                    audio.duration_seconds(),
                    audio.sample_rate
                );
                self.audio = Some(audio);
                self.status = SourceStatus::Ready;
                // A seek issued while loading is kept
                let duration = self.duration().unwrap_or(0.0);
                self.position = self.position.min(duration);
                self.ended = duration > 0.0 && self.position >= duration;
            }
            Err(e) => {
                log::warn!("Stem '{}' failed to load: {}", self.id, e);
                self.status = SourceStatus::Failed(e);
            }
        }
    }
}

impl StemSource for BufferedSource {
    fn id(&self) -> &StemId {
        &self.id
    }

    fn poll_status(&mut self) -> SourceStatus {
        if let Some(rx) = &self.pending {
            match rx.try_recv() {
                Ok(result) => {
                    self.pending = None;
                    self.finish_loading(result);
                }
                Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => {
                    self.pending = None;
                    self.finish_loading(Err(SourceLoadError::LoaderGone(self.uri.clone())));
                }
            }
        }
        self.status.clone()
    }

    fn duration(&self) -> Option<f64> {
        self.audio.as_ref().map(DecodedAudio::duration_seconds)
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn set_position(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        match self.duration() {
            Some(duration) => {
                self.position = seconds.min(duration);
                self.ended = self.position >= duration;
                if self.ended {
                    self.playing = false;
                }
            }
            None => self.position = seconds,
        }
    }

    fn start(&mut self) -> StartHandle {
        if !self.status.is_ready() {
            return StartHandle::ready(Err(TransportError::NotReady));
        }
        if self.ended {
            // Nothing left to play; report started so the clock can end naturally
            return StartHandle::ready(Ok(()));
        }
        self.playing = true;
        StartHandle::ready(Ok(()))
    }

    fn pause(&mut self) {
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn has_ended(&self) -> bool {
        self.ended
    }

    fn set_volume(&mut self, volume: f32) {
        if self.playing {
            self.gain.set_target(volume);
        } else {
            self.gain.snap(volume);
        }
    }

    fn volume(&self) -> f32 {
        self.gain.target()
    }

    fn snap_volume(&mut self, volume: f32) {
        self.gain.snap(volume);
    }

    fn render(&mut self, out: &mut StereoBuffer) {
        let audio = match (&self.audio, self.playing) {
            (Some(audio), true) if !audio.frames.is_empty() => audio,
            _ => {
                out.fill_silence();
                return;
            }
        };

        let frames = &audio.frames;
        let src_rate = audio.sample_rate as f64;
        let step = src_rate / self.output_rate as f64;
        let mut cursor = self.position * src_rate;
        let last = frames.len() - 1;

        for sample in out.iter_mut() {
            let index = cursor as usize;
            if index > last {
                *sample = StereoSample::silence();
                continue;
            }
            let frac = (cursor - index as f64) as f32;
            let next = if index < last { frames[index + 1] } else { StereoSample::silence() };
            *sample = frames[index].lerp(&next, frac);
            cursor += step;
        }

        let total = frames.len() as f64;
        if cursor >= total {
            cursor = total;
            self.ended = true;
            self.playing = false;
        }
        self.position = cursor / src_rate;

        self.gain.process(out);
    }

    fn release(&mut self) {
        self.pending = None;
        self.audio = None;
        self.playing = false;
    }
}
