//! Stem sources - one playable audio stream per stem
//!
//! A source owns its stream and transport primitives. Nothing here blocks:
//! loading happens in the background and readiness is observed by polling
//! [`StemSource::poll_status`]. Starting returns a [`StartHandle`] the engine
//! awaits only after every source has been told to start.

mod buffered;
mod decode;
mod loader;

pub use buffered::BufferedSource;
pub use decode::{decode_wav, resolve_uri, DecodedAudio};
pub use loader::FileSourceFactory;

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

use crate::error::{SourceLoadError, TransportError};
use crate::types::{StemId, StemKind, StereoBuffer};

/// What the session knows about a stem before loading it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StemDescriptor {
    pub id: StemId,
    #[serde(default)]
    pub kind: StemKind,
    pub stream_uri: String,
}

impl StemDescriptor {
    pub fn new(id: impl Into<String>, kind: StemKind, stream_uri: impl Into<String>) -> Self {
        Self {
            id: StemId::new(id),
            kind,
            stream_uri: stream_uri.into(),
        }
    }
}

/// Load state of a source
///
/// `Loading → Ready | Failed`. A failed source stays failed.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceStatus {
    Loading,
    Ready,
    Failed(SourceLoadError),
}

impl SourceStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, SourceStatus::Ready)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SourceStatus::Failed(_))
    }
}

/// Pending acknowledgement of a start request
#[derive(Debug)]
pub struct StartHandle {
    rx: oneshot::Receiver<Result<(), TransportError>>,
}

impl StartHandle {
    /// A handle that is already resolved
    pub fn ready(result: Result<(), TransportError>) -> Self {
        let (tx, handle) = Self::pending();
        // The receiver is alive in `handle`, so this cannot fail
        let _ = tx.send(result);
        handle
    }

    /// A handle resolved later through the returned sender
    pub fn pending() -> (oneshot::Sender<Result<(), TransportError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Check for an answer without waiting
    ///
    /// `None` while the transport has not answered yet.
    pub fn poll(&mut self) -> Option<Result<(), TransportError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(TransportError::Dropped)),
        }
    }

    /// Wait for the transport to confirm or refuse
    pub async fn wait(self) -> Result<(), TransportError> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Dropped),
        }
    }
}

/// A single playable audio stream
///
/// Positions are in seconds of stream time. `render` is called from the
/// engine's render path and must not block or fail; a source that is not
/// playing renders silence.
pub trait StemSource: Send {
    fn id(&self) -> &StemId;

    /// Advance background loading and report the current status
    fn poll_status(&mut self) -> SourceStatus;

    /// Length in seconds, `None` until loaded
    fn duration(&self) -> Option<f64>;

    fn position(&self) -> f64;

    fn set_position(&mut self, seconds: f64);

    /// Begin playback; the handle resolves when the transport is running
    fn start(&mut self) -> StartHandle;

    fn pause(&mut self);

    fn is_playing(&self) -> bool;

    /// Whether playback reached the end of the stream
    fn has_ended(&self) -> bool;

    /// Transport-level volume (0.0..=1.0)
    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    /// Set the volume at once, skipping any ramp
    fn snap_volume(&mut self, volume: f32) {
        self.set_volume(volume);
    }

    /// Fill `out` with the next block (length is set by the caller)
    fn render(&mut self, out: &mut StereoBuffer);

    /// Drop decoded audio and stop any background work
    fn release(&mut self) {}
}

/// Creates sources for the stems of a session
pub trait SourceFactory: Send {
    fn open(&self, descriptor: &StemDescriptor, sample_rate: u32, smoothing_secs: f32) -> Box<dyn StemSource>;
}
