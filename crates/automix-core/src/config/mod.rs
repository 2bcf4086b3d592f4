//! Engine configuration
//!
//! - [`MixerConfig`]: crossfade lengths, tempo matching, vocoder frame size
//! - [`AnalysisConfig`]: beat analyzer windows and tempo range
//! - Generic YAML load/save and the default config location
//!
//! # Usage
//!
//! ```ignore
//! use automix_core::config::{default_config_path, load_config, MixerConfig};
//!
//! let config: MixerConfig = load_config(&default_config_path());
//! ```

mod io;
mod mixer;
mod paths;

pub use io::{load_config, save_config};
pub use mixer::{AnalysisConfig, MixerConfig};
pub use paths::{default_config_dir, default_config_path, CONFIG_FILE_NAME};
