//! WAV decoding for stem streams
//!
//! Decodes a whole file into memory as stereo frames at the file's own rate.
//! Rate conversion happens at playback time in [`super::BufferedSource`].

use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader};

use crate::error::SourceLoadError;
use crate::types::StereoSample;

/// A fully decoded stem
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudio {
    /// Native sample rate of the frames
    pub sample_rate: u32,
    pub frames: Vec<StereoSample>,
}

impl DecodedAudio {
    pub fn new(sample_rate: u32, frames: Vec<StereoSample>) -> Self {
        Self { sample_rate, frames }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames.len() as f64 / self.sample_rate as f64
    }
}

/// Resolve a stream locator to a local path
///
/// Accepts `file://` URIs and plain paths. Any other scheme is rejected.
pub fn resolve_uri(uri: &str) -> Result<PathBuf, SourceLoadError> {
    if let Some(path) = uri.strip_prefix("file://") {
        return Ok(PathBuf::from(path));
    }
    match uri.split_once("://") {
        Some(_) => Err(SourceLoadError::UnsupportedUri(uri.to_string())),
        None => Ok(PathBuf::from(uri)),
    }
}

/// Decode a WAV file into stereo frames
///
/// Supports 16/24/32-bit integer and 32-bit float PCM. Mono is duplicated to
/// both channels; more than two channels is rejected.
pub fn decode_wav(path: &Path) -> Result<DecodedAudio, SourceLoadError> {
    let uri = path.display().to_string();
    let mut reader = WavReader::open(path).map_err(|e| SourceLoadError::Open {
        uri: uri.clone(),
        reason: e.to_string(),
    })?;

    let spec = reader.spec();
    let channels = spec.channels as usize;
    if channels == 0 || channels > 2 {
        return Err(SourceLoadError::UnsupportedFormat {
            uri,
            detail: format!("{} channels (mono or stereo only)", channels),
        });
    }

    let decode_err = |e: hound::Error| SourceLoadError::Decode {
        uri: uri.clone(),
        reason: e.to_string(),
    };

    let samples: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, 32) => reader
            .samples::<f32>()
            .collect::<Result<_, _>>()
            .map_err(decode_err)?,
        (SampleFormat::Int, bits @ (16 | 24 | 32)) => {
            let scale = 1.0 / (1u64 << (bits - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()
                .map_err(decode_err)?
        }
        (format, bits) => {
            return Err(SourceLoadError::UnsupportedFormat {
                uri: uri.clone(),
                detail: format!("{}-bit {:?}", bits, format),
            })
        }
    };

    let frames = if channels == 1 {
        samples.into_iter().map(StereoSample::mono).collect()
    } else {
        samples
            .chunks_exact(2)
            .map(|pair| StereoSample::new(pair[0], pair[1]))
            .collect()
    };

    Ok(DecodedAudio::new(spec.sample_rate, frames))
}
