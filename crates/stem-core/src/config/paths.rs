//! Standard locations for stem studio configuration files

use std::path::PathBuf;

/// Directory name under the platform config dir
const APP_DIR: &str = "stem-studio";

/// Get the stem studio configuration directory
///
/// Returns: `<config_dir>/stem-studio` (e.g. `~/.config/stem-studio` on Linux),
/// or `./stem-studio` when the platform has no config directory.
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Get the default engine settings path
///
/// Returns: `<config_dir>/stem-studio/engine.yaml`
pub fn default_config_path() -> PathBuf {
    config_dir().join("engine.yaml")
}
