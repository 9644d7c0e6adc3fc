use std::path::{Path, PathBuf};

use stepsync_core::{Config, ConfigError};

pub mod accounts;
pub mod config;
pub mod run;
pub mod session;

pub type CommandResult = Result<(), Box<dyn std::error::Error>>;

/// Resolve the config path (`--config` wins over the default location).
pub fn config_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    match explicit {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::default_path(),
    }
}

pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    Config::load_from(&config_path(explicit)?)
}
