//! Mixdown progress messages
//!
//! Sent from the render loop to whoever passed a sender in
//! [`MixdownOptions`](super::MixdownOptions):
//!
//! Started → Rendered → ... → Complete

use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub enum MixdownProgress {
    /// Rendering started
    Started {
        /// Expected length in seconds (session duration or the cap)
        expected_seconds: f64,
    },

    /// Another second of audio was written
    Rendered {
        seconds: f64,
        expected_seconds: f64,
    },

    /// WAV finalized
    Complete {
        path: PathBuf,
        seconds: f64,
        /// Wall-clock time spent rendering
        elapsed: Duration,
    },
}

impl MixdownProgress {
    /// Human-readable description for logs and status lines
    pub fn description(&self) -> String {
        match self {
            Self::Started { expected_seconds } => {
                format!("Rendering mixdown ({:.1}s)", expected_seconds)
            }
            Self::Rendered {
                seconds,
                expected_seconds,
            } => format!("Rendered {:.0}/{:.0}s", seconds, expected_seconds),
            Self::Complete {
                path,
                seconds,
                elapsed,
            } => format!(
                "Mixdown complete: {:.1}s of audio in {:.1}s -> {}",
                seconds,
                elapsed.as_secs_f64(),
                path.display()
            ),
        }
    }

    /// Fraction done in `0.0..=1.0`
    pub fn fraction(&self) -> f32 {
        match self {
            Self::Started { .. } => 0.0,
            Self::Rendered {
                seconds,
                expected_seconds,
            } if *expected_seconds > 0.0 => (seconds / expected_seconds).clamp(0.0, 1.0) as f32,
            Self::Rendered { .. } | Self::Complete { .. } => 1.0,
        }
    }
}
