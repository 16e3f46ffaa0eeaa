//! Render loop writing the master bus to disk

use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::time::Instant;

use thiserror::Error;

use super::MixdownProgress;
use crate::engine::PlaybackEngine;
use crate::error::EngineError;
use crate::types::StereoBuffer;

/// Errors from rendering a mixdown
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("No audible stem to render")]
    NoActiveStems,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("WAV write failed: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mixdown parameters
#[derive(Debug, Clone, Default)]
pub struct MixdownOptions {
    /// Stop after this many seconds even if stems keep playing
    pub max_seconds: Option<f64>,
    /// Refuse to render while any stem is loading or failed
    pub require_all_loaded: bool,
    pub progress: Option<Sender<MixdownProgress>>,
}

/// What was written
#[derive(Debug, Clone, PartialEq)]
pub struct MixdownReport {
    pub path: PathBuf,
    pub sample_rate: u32,
    pub frames: u64,
    /// Largest absolute sample before clamping
    pub peak: f32,
}

impl MixdownReport {
    pub fn seconds(&self) -> f64 {
        self.frames as f64 / self.sample_rate as f64
    }

    /// Whether any sample had to be clamped
    pub fn clipped(&self) -> bool {
        self.peak > 1.0
    }
}

fn to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * 32767.0) as i16
}

fn write_block<W: std::io::Write + std::io::Seek>(
    writer: &mut hound::WavWriter<W>,
    block: &StereoBuffer,
) -> Result<(), hound::Error> {
    for &sample in block.as_interleaved() {
        writer.write_sample(to_i16(sample))?;
    }
    Ok(())
}

fn send(progress: &Option<Sender<MixdownProgress>>, message: MixdownProgress) {
    if let Some(tx) = progress {
        // Receiver may have gone away; rendering carries on
        let _ = tx.send(message);
    }
}

/// Render the engine's current mix from 0 into a WAV file at `path`
///
/// Playback is started from the beginning and driven block by block,
/// ticking the clock after each block, until the natural end or
/// `max_seconds`. The engine is left stopped at 0.
pub async fn render_mixdown(
    engine: &mut PlaybackEngine,
    path: &Path,
    options: &MixdownOptions,
) -> Result<MixdownReport, ExportError> {
    if options.require_all_loaded {
        engine.require_all_loaded()?;
    }

    let state = engine.state();
    if !state.stems.iter().any(|s| s.audible && s.status.is_ready()) {
        return Err(ExportError::NoActiveStems);
    }

    let sample_rate = engine.sample_rate();
    let expected_seconds = options
        .max_seconds
        .map_or(state.duration, |max| max.min(state.duration));

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::new(BufWriter::new(fs::File::create(path)?), spec)?;

    log::info!(
        "Mixdown to {} ({:.1}s expected, {} Hz)",
        path.display(),
        expected_seconds,
        sample_rate
    );
    send(&options.progress, MixdownProgress::Started { expected_seconds });

    let started = Instant::now();
    engine.stop()?;
    engine.play().await?;

    let mut block = StereoBuffer::silence(engine.config().block_size);
    let mut frames: u64 = 0;
    let mut peak = 0.0f32;
    let mut next_report = sample_rate as u64;

    let result = loop {
        engine.process(&mut block);
        peak = peak.max(block.peak());
        if let Err(e) = write_block(&mut writer, &block) {
            break Err(e);
        }
        frames += block.len() as u64;

        if frames >= next_report {
            next_report += sample_rate as u64;
            send(
                &options.progress,
                MixdownProgress::Rendered {
                    seconds: frames as f64 / sample_rate as f64,
                    expected_seconds,
                },
            );
        }

        let report = engine.tick();
        if report.ended || !engine.is_playing() {
            break Ok(());
        }
        if let Some(max) = options.max_seconds {
            if frames as f64 / sample_rate as f64 >= max {
                break Ok(());
            }
        }
    };

    engine.stop()?;
    result?;
    writer.finalize()?;

    let report = MixdownReport {
        path: path.to_path_buf(),
        sample_rate,
        frames,
        peak,
    };
    if report.clipped() {
        log::warn!("Mixdown clipped (peak {:.2})", report.peak);
    }
    let complete = MixdownProgress::Complete {
        path: report.path.clone(),
        seconds: report.seconds(),
        elapsed: started.elapsed(),
    };
    log::info!("{}", complete.description());
    send(&options.progress, complete);
    Ok(report)
}
