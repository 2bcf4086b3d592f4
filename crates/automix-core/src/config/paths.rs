//! Standard locations for automix configuration

use std::path::PathBuf;

pub const CONFIG_FILE_NAME: &str = "automix.yaml";

/// Returns `~/.config/automix` (platform config dir), or `./automix` when
/// the platform has none
pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("automix")
}

/// Returns `<config dir>/automix.yaml`
pub fn default_config_path() -> PathBuf {
    default_config_dir().join(CONFIG_FILE_NAME)
}
