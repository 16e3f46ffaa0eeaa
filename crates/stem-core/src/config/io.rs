//! YAML configuration I/O
//!
//! Generic loading and saving for any serde configuration type. Engine
//! settings and mixdown sessions both go through here.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file, falling back to defaults
///
/// A missing file yields `T::default()`. An unreadable or malformed file is
/// logged as a warning and also yields the defaults, so a broken settings
/// file never prevents the engine from starting.
///
/// # Example
///
/// ```ignore
/// let config: EngineConfig = load_config(&default_config_path());
/// ```
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} not found, using defaults", path);
        return T::default();
    }

    match read_config(path) {
        Ok(config) => {
            log::info!("load_config: Loaded {:?}", path);
            config
        }
        Err(e) => {
            log::warn!("load_config: {:#}, using defaults", e);
            T::default()
        }
    }
}

/// Load configuration from a YAML file, reporting every failure
///
/// Used when the caller named the file explicitly and a silent fallback
/// would hide a typo.
pub fn read_config<T>(path: &Path) -> Result<T>
where
    T: DeserializeOwned,
{
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    serde_yaml::from_str::<T>(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))
}

/// Save configuration to a YAML file
///
/// Creates parent directories if they don't exist.
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    log::info!("save_config: Saving to {:?}", path);

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config: EngineConfig = load_config(Path::new("/nonexistent/path/engine.yaml"));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("engine.yaml");

        let config = EngineConfig {
            block_size: 256,
            drift_threshold_secs: 0.2,
            ..EngineConfig::default()
        };

        save_config(&config, &path).unwrap();
        let loaded: EngineConfig = load_config(&path);

        assert_eq!(loaded.block_size, 256);
        assert_eq!(loaded.drift_threshold_secs, 0.2);
        assert_eq!(loaded.sample_rate, config.sample_rate);
    }

    #[test]
    fn test_malformed_file_falls_back_but_strict_read_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.yaml");
        std::fs::write(&path, "sample_rate: [not, a, number]").unwrap();

        let config: EngineConfig = load_config(&path);
        assert_eq!(config, EngineConfig::default());

        let strict: Result<EngineConfig> = read_config(&path);
        assert!(strict.is_err());
    }
}
