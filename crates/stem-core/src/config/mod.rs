//! Configuration for the stem studio engine
//!
//! - Generic YAML config loading/saving
//! - Standard config paths
//! - `EngineConfig` tuning values
//!
//! # Usage
//!
//! ```ignore
//! use stem_core::config::{default_config_path, load_config, EngineConfig};
//!
//! let config: EngineConfig = load_config(&default_config_path());
//! ```

mod engine;
mod io;
mod paths;

pub use engine::EngineConfig;
pub use io::{load_config, read_config, save_config};
pub use paths::{config_dir, default_config_path};
