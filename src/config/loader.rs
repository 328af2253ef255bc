// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ExecutorSettings, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw
/// `RawConfigFile`.
///
/// This only performs TOML deserialization. Use [`load_and_validate`] to get
/// usable [`ExecutorSettings`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file from path and validate it into settings.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ExecutorSettings> {
    let raw_config = load_from_path(&path)?;
    let settings = ExecutorSettings::try_from(raw_config)?;
    Ok(settings)
}

/// Load settings for the binary.
///
/// - An explicit path must exist.
/// - Without one, [`default_config_path`] is used if present, otherwise the
///   built-in defaults apply.
pub fn load_or_default(explicit: Option<&Path>) -> Result<ExecutorSettings> {
    match explicit {
        Some(path) => load_and_validate(path),
        None => {
            let path = default_config_path();
            if path.is_file() {
                load_and_validate(&path)
            } else {
                debug!(path = %path.display(), "no config file; using defaults");
                Ok(ExecutorSettings::default())
            }
        }
    }
}

/// `Replrun.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Replrun.toml")
}
