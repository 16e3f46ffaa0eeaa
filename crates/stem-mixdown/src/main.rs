//! stem-mixdown - render a stem session to a stereo WAV
//!
//! Loads every stem listed in a session YAML, applies the session's mixer
//! preset (volumes, mute/solo, effects) and renders the mix offline.
//!
//! ## Usage
//!
//! ```text
//! stem-mixdown <session.yaml> <out.wav> [--config engine.yaml] [--max-seconds N] [--strict]
//! ```
//!
//! - `--config`: engine config (defaults to `~/.config/stem-studio/engine.yaml`)
//! - `--max-seconds`: stop rendering after N seconds
//! - `--strict`: fail if any stem fails to load instead of skipping it

mod session;

use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use stem_core::config::{default_config_path, load_config, read_config, EngineConfig};
use stem_core::engine::SourceEvent;
use stem_core::export::{render_mixdown, MixdownOptions, MixdownProgress};
use stem_core::PlaybackEngine;

use session::Session;

const USAGE: &str =
    "usage: stem-mixdown <session.yaml> <out.wav> [--config engine.yaml] [--max-seconds N] [--strict]";

#[derive(Debug, Default, PartialEq)]
struct Args {
    session: PathBuf,
    output: PathBuf,
    config: Option<PathBuf>,
    max_seconds: Option<f64>,
    strict: bool,
}

fn parse_args(args: impl IntoIterator<Item = String>) -> Result<Args> {
    let mut positional = Vec::new();
    let mut parsed = Args::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args.next().context("--config needs a path")?;
                parsed.config = Some(PathBuf::from(value));
            }
            "--max-seconds" => {
                let value = args.next().context("--max-seconds needs a value")?;
                let seconds: f64 = value
                    .parse()
                    .with_context(|| format!("Invalid --max-seconds '{}'", value))?;
                if !(seconds.is_finite() && seconds > 0.0) {
                    bail!("--max-seconds must be positive, got {}", seconds);
                }
                parsed.max_seconds = Some(seconds);
            }
            "--strict" => parsed.strict = true,
            "-h" | "--help" => bail!("{}", USAGE),
            flag if flag.starts_with("--") => bail!("Unknown flag {}\n{}", flag, USAGE),
            _ => positional.push(PathBuf::from(arg)),
        }
    }

    match <[PathBuf; 2]>::try_from(positional) {
        Ok([session, output]) => {
            parsed.session = session;
            parsed.output = output;
            Ok(parsed)
        }
        Err(_) => bail!("{}", USAGE),
    }
}

fn main() -> Result<()> {
    // Set RUST_LOG=debug for drift corrections and transport detail
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args = parse_args(std::env::args().skip(1))?;

    let config: EngineConfig = match &args.config {
        Some(path) => read_config(path)?,
        None => load_config(&default_config_path()),
    };
    let session = Session::load(&args.session)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("Failed to start async runtime")?;
    runtime.block_on(run(config, session, args))
}

async fn run(config: EngineConfig, session: Session, args: Args) -> Result<()> {
    let poll_interval = Duration::from_millis(config.meter_interval_ms);
    let mut engine = PlaybackEngine::with_file_sources(config);
    engine.load_session(session.stems)?;

    // Wait for background decoding
    loop {
        for event in engine.poll_sources() {
            match event {
                SourceEvent::Ready { id, duration } => {
                    log::info!("Loaded '{}' ({:.1}s)", id, duration)
                }
                SourceEvent::Failed { id, error } => log::warn!("Skipping '{}': {}", id, error),
                SourceEvent::StartFailed { id, error } => {
                    log::warn!("'{}' could not start: {}", id, error)
                }
                SourceEvent::AllSettled { ready, failed } => {
                    log::info!("{} stems ready, {} failed", ready, failed)
                }
            }
        }
        if !engine.is_loading() {
            break;
        }
        tokio::time::sleep(poll_interval).await;
    }

    engine.enable_effects()?;
    if let Some(preset) = &session.preset {
        engine.load_preset(preset).context("Session preset rejected")?;
    }

    let (progress_tx, progress_rx) = mpsc::channel::<MixdownProgress>();
    let reporter = thread::Builder::new()
        .name("mixdown-progress".into())
        .spawn(move || {
            for message in progress_rx {
                log::info!("[{:>3.0}%] {}", message.fraction() * 100.0, message.description());
            }
        })
        .context("Failed to spawn progress thread")?;

    let options = MixdownOptions {
        max_seconds: args.max_seconds.or(session.max_seconds),
        require_all_loaded: args.strict,
        progress: Some(progress_tx),
    };
    let result = render_mixdown(&mut engine, &args.output, &options).await;
    drop(options);
    let _ = reporter.join();
    engine.shutdown();

    let report = result.with_context(|| format!("Mixdown to {:?} failed", args.output))?;
    println!(
        "Wrote {:.1}s to {} (peak {:.2}{})",
        report.seconds(),
        report.path.display(),
        report.peak,
        if report.clipped() { ", clipped" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_positional_and_flags() {
        let parsed = args(&["song.yaml", "out.wav", "--max-seconds", "12.5", "--strict"]).unwrap();
        assert_eq!(parsed.session, PathBuf::from("song.yaml"));
        assert_eq!(parsed.output, PathBuf::from("out.wav"));
        assert_eq!(parsed.max_seconds, Some(12.5));
        assert!(parsed.strict);
        assert_eq!(parsed.config, None);

        let parsed = args(&["--config", "e.yaml", "a.yaml", "b.wav"]).unwrap();
        assert_eq!(parsed.config, Some(PathBuf::from("e.yaml")));
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(args(&["only.yaml"]).is_err());
        assert!(args(&["a", "b", "c"]).is_err());
        assert!(args(&["a", "b", "--max-seconds", "-1"]).is_err());
        assert!(args(&["a", "b", "--loud"]).is_err());
        assert!(args(&["a", "b", "--config"]).is_err());
    }
}
