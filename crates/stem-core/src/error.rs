//! Engine error types
//!
//! Every fallible engine command returns [`EngineResult`]. Source-level
//! failures have their own types so they can be stored in per-stem status
//! and carried through events without dragging the whole engine error along.

use thiserror::Error;

use crate::types::StemId;

/// A stem's audio stream could not be loaded or decoded
///
/// Cloneable so a failed source can keep reporting the same error every
/// time its status is polled.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceLoadError {
    /// Locator scheme the source factory does not understand
    #[error("Unsupported stream locator: {0}")]
    UnsupportedUri(String),

    /// The stream could not be opened
    #[error("Failed to open {uri}: {reason}")]
    Open { uri: String, reason: String },

    /// The stream opened but its contents could not be decoded
    #[error("Failed to decode {uri}: {reason}")]
    Decode { uri: String, reason: String },

    /// Sample layout the decoder cannot handle
    #[error("Unsupported audio format in {uri}: {detail}")]
    UnsupportedFormat { uri: String, detail: String },

    /// The loader went away before delivering a result
    #[error("Loader for {0} terminated without a result")]
    LoaderGone(String),
}

/// A source refused or failed to start its transport
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransportError {
    /// The source is still loading or failed to load
    #[error("Source is not ready to start")]
    NotReady,

    /// The transport rejected the start request
    #[error("Transport refused to start: {0}")]
    Refused(String),

    /// The acknowledgement channel closed before a reply arrived
    #[error("Start acknowledgement was dropped")]
    Dropped,
}

/// Errors returned by engine commands
///
/// None of these are fatal: the engine stays usable after any rejection.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// A stem failed to load (surfaced when a caller requires every stem)
    #[error("Stem '{stem}' failed to load: {source}")]
    SourceLoad {
        stem: StemId,
        #[source]
        source: SourceLoadError,
    },

    /// `play()` could not start a source; every source has been paused
    #[error("Stem '{stem}' failed to start: {source}")]
    TransportStart {
        stem: StemId,
        #[source]
        source: TransportError,
    },

    /// Non-finite value, unknown preset name or duplicate stem id
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Command issued before the session or the effects are ready
    #[error("Engine not ready: {0}")]
    NotReady(&'static str),

    /// The stem id is not part of the loaded session
    #[error("Unknown stem: {0}")]
    UnknownStem(StemId),
}

impl EngineError {
    pub(crate) fn invalid(detail: impl Into<String>) -> Self {
        EngineError::InvalidParameter(detail.into())
    }
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
