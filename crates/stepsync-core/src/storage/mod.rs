mod config;

pub use config::{AccountEntry, AccountSet, Config, NetworkConfig, NotifyConfig, RejectedAccount, StorageConfig};

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns `~/.config/stepsync[-dev]/` based on STEPSYNC_ENV.
///
/// Set STEPSYNC_ENV=dev to use development data directory.
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("STEPSYNC_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("stepsync-dev")
    } else {
        base_dir.join("stepsync")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}
