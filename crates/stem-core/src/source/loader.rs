//! Background WAV loading
//!
//! Each stem is decoded on its own named thread. The result comes back over
//! a bounded crossbeam channel that the source drains when polled, so the
//! engine never waits on disk I/O.

use std::thread;

use crossbeam::channel::bounded;

use super::buffered::{BufferedSource, LoadResult};
use super::decode::{decode_wav, resolve_uri};
use super::{SourceFactory, StemDescriptor, StemSource};
use crate::error::SourceLoadError;

/// Opens `file://` URIs and plain paths as [`BufferedSource`]s
#[derive(Debug, Clone, Default)]
pub struct FileSourceFactory;

impl FileSourceFactory {
    pub fn new() -> Self {
        Self
    }
}

impl SourceFactory for FileSourceFactory {
    fn open(&self, descriptor: &StemDescriptor, sample_rate: u32, smoothing_secs: f32) -> Box<dyn StemSource> {
        let id = descriptor.id.clone();
        let uri = descriptor.stream_uri.clone();

        let path = match resolve_uri(&uri) {
            Ok(path) => path,
            Err(e) => {
                log::warn!("Stem '{}': {}", id, e);
                return Box::new(BufferedSource::failed(id, uri, e, sample_rate));
            }
        };

        let (tx, rx) = bounded::<LoadResult>(1);
        let spawned = thread::Builder::new()
            .name(format!("stem-loader-{}", id))
            .spawn(move || {
                let result = decode_wav(&path);
                // The source may already have been released
                let _ = tx.send(result);
            });

        match spawned {
            Ok(_) => {
                log::debug!("Stem '{}': loading {}", id, uri);
                Box::new(BufferedSource::loading(id, uri, rx, sample_rate, smoothing_secs))
            }
            Err(e) => {
                log::error!("Stem '{}': failed to spawn loader thread: {}", id, e);
                let error = SourceLoadError::Open {
                    uri: uri.clone(),
                    reason: e.to_string(),
                };
                Box::new(BufferedSource::failed(id, uri, error, sample_rate))
            }
        }
    }
}
