//! Session files for the mixdown tool
//!
//! ```yaml
//! stems:
//!   - id: vocals
//!     kind: vocal
//!     streamUri: stems/vocals.wav
//!   - id: drums
//!     streamUri: file:///music/song/drums.wav
//! preset:
//!   masterVolume: 0.85
//!   stems:
//!     vocals: { volume: 0.9, effects: { reverb: { enabled: true, wetDry: 0.2, decay: 1.2 } } }
//! maxSeconds: 30
//! ```
//!
//! Relative stem paths are resolved against the session file's directory.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use stem_core::config::read_config;
use stem_core::engine::MixerPreset;
use stem_core::source::StemDescriptor;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub stems: Vec<StemDescriptor>,
    #[serde(default)]
    pub preset: Option<MixerPreset>,
    /// Cap on rendered length in seconds
    #[serde(default)]
    pub max_seconds: Option<f64>,
}

impl Session {
    /// Read a session file and resolve its stem paths
    pub fn load(path: &Path) -> Result<Self> {
        let mut session: Session =
            read_config(path).with_context(|| format!("Invalid session file {:?}", path))?;
        if session.stems.is_empty() {
            bail!("Session {:?} lists no stems", path);
        }
        if let Some(base) = path.parent() {
            session.resolve_paths(base);
        }
        Ok(session)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for stem in &mut self.stems {
            if stem.stream_uri.contains("://") {
                continue;
            }
            let uri = Path::new(&stem.stream_uri);
            if uri.is_relative() {
                stem.stream_uri = base.join(uri).display().to_string();
            }
        }
    }
}
