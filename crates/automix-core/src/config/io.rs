//! YAML configuration I/O
//!
//! Works with any serializable configuration type; a missing or broken file
//! never stops the engine from starting.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;

/// Load configuration from a YAML file
///
/// Returns defaults if the file doesn't exist, or if it can't be read or
/// parsed (a warning is logged).
pub fn load_config<T>(path: &Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        log::info!("load_config: {:?} not found, using defaults", path);
        return T::default();
    }

    let parsed = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))
        .and_then(|contents| {
            serde_yaml::from_str::<T>(&contents)
                .with_context(|| format!("Failed to parse config file: {:?}", path))
        });

    match parsed {
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

/// Save configuration to a YAML file, creating parent directories
pub fn save_config<T>(config: &T, path: &Path) -> Result<()>
where
    T: Serialize,
{
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
    }

    let yaml = serde_yaml::to_string(config).context("Failed to serialize config to YAML")?;
    std::fs::write(path, yaml)
        .with_context(|| format!("Failed to write config file: {:?}", path))?;

    log::info!("save_config: Saved {:?}", path);
    Ok(())
}
