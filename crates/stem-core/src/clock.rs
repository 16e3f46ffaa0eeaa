//! Playback clock - one authoritative time from N independent sources
//!
//! Every tick while playing the engine samples each ready source and hands
//! the readings to [`PlaybackClock::reconcile`]:
//!
//! 1. Sources that have ended are left out.
//! 2. `avg` is the mean position of the rest.
//! 3. The source furthest from `avg` is snapped back if its drift exceeds
//!    the threshold. At most one source is corrected per tick.
//! 4. `avg` is published as the current time.
//!
//! The clock itself never touches a source; it returns what to do and the
//! engine applies it.

use crate::config::EngineConfig;

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockState {
    Stopped,
    Playing,
    /// Transient while every source is being repositioned
    Seeking,
}

/// One source's reading for a tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    /// Caller's index for the source (returned in corrections)
    pub index: usize,
    /// Position in seconds
    pub time: f64,
    pub ended: bool,
    /// Seconds left until the source's own end
    pub remaining: f64,
}

impl ClockSample {
    pub fn new(index: usize, time: f64, ended: bool, remaining: f64) -> Self {
        Self {
            index,
            time,
            ended,
            remaining,
        }
    }
}

/// Snap one source back to the mean
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftCorrection {
    pub index: usize,
    /// Absolute distance from the mean, seconds
    pub drift: f64,
    /// Position to set, seconds
    pub target: f64,
}

/// Result of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Not playing, or nothing to sample
    Idle,
    /// Time advanced, with an optional correction for one source
    Advanced {
        time: f64,
        correction: Option<DriftCorrection>,
    },
    /// Every source reached its end; the clock is stopped and back at 0
    Ended,
}

/// Find the single source to correct, if any
///
/// Ended sources are ignored. Returns the source with the largest drift from
/// the mean when that drift is strictly greater than `threshold`.
pub fn find_drift_correction(samples: &[ClockSample], threshold: f64) -> Option<DriftCorrection> {
    let avg = mean_time(samples)?;
    samples
        .iter()
        .filter(|s| !s.ended)
        .map(|s| DriftCorrection {
            index: s.index,
            drift: (s.time - avg).abs(),
            target: avg,
        })
        .fold(None, |worst: Option<DriftCorrection>, c| match worst {
            Some(w) if w.drift >= c.drift => Some(w),
            _ => Some(c),
        })
        .filter(|c| c.drift > threshold)
}

/// Mean position over sources that have not ended
fn mean_time(samples: &[ClockSample]) -> Option<f64> {
    let (sum, count) = samples
        .iter()
        .filter(|s| !s.ended)
        .fold((0.0, 0usize), |(sum, count), s| (sum + s.time, count + 1));
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Derived playback time with drift correction
#[derive(Debug, Clone)]
pub struct PlaybackClock {
    state: ClockState,
    current_time: f64,
    drift_threshold: f64,
    end_tolerance: f64,
}

impl PlaybackClock {
    pub fn new(drift_threshold: f64, end_tolerance: f64) -> Self {
        Self {
            state: ClockState::Stopped,
            current_time: 0.0,
            drift_threshold,
            end_tolerance,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.drift_threshold_secs, config.end_tolerance_secs)
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == ClockState::Playing
    }

    /// Published time in seconds
    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn start(&mut self) {
        self.state = ClockState::Playing;
    }

    /// Stop advancing, keeping the published time (pause)
    pub fn stop(&mut self) {
        self.state = ClockState::Stopped;
    }

    /// Stop and return to 0
    pub fn reset(&mut self) {
        self.state = ClockState::Stopped;
        self.current_time = 0.0;
    }

    /// Enter `Seeking` and publish `time`; returns whether playback was running
    pub fn begin_seek(&mut self, time: f64) -> bool {
        let was_playing = self.is_playing();
        self.state = ClockState::Seeking;
        self.current_time = time;
        was_playing
    }

    /// Leave `Seeking`, resuming playback if requested
    pub fn finish_seek(&mut self, resume: bool) {
        self.state = if resume {
            ClockState::Playing
        } else {
            ClockState::Stopped
        };
    }

    /// Whether every source counts as ended
    ///
    /// A source within the end tolerance of its own end counts once at least
    /// one other source has actually ended.
    fn all_ended(&self, samples: &[ClockSample]) -> bool {
        samples.iter().any(|s| s.ended)
            && samples
                .iter()
                .all(|s| s.ended || s.remaining <= self.end_tolerance)
    }

    /// Reconcile one tick's readings
    pub fn reconcile(&mut self, samples: &[ClockSample]) -> TickOutcome {
        if !self.is_playing() || samples.is_empty() {
            return TickOutcome::Idle;
        }

        if self.all_ended(samples) {
            self.reset();
            return TickOutcome::Ended;
        }

        let Some(avg) = mean_time(samples) else {
            return TickOutcome::Idle;
        };
        let correction = find_drift_correction(samples, self.drift_threshold);
        self.current_time = avg;

        TickOutcome::Advanced {
            time: avg,
            correction,
        }
    }
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}
