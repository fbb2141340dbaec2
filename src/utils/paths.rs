//! Cross-Platform Path Utilities
//!
//! Functions for resolving application directories across platforms.
//! Everything askdb persists lives under ~/.askdb/ unless configured otherwise.

use std::path::{Path, PathBuf};

use crate::utils::error::{AppError, AppResult};

/// Get the user's home directory
pub fn home_dir() -> AppResult<PathBuf> {
    dirs::home_dir().ok_or_else(|| AppError::config("Could not determine home directory"))
}

/// Get the askdb directory (~/.askdb/)
pub fn askdb_dir() -> AppResult<PathBuf> {
    Ok(home_dir()?.join(".askdb"))
}

/// Get the config file path (~/.askdb/config.json)
pub fn config_path() -> AppResult<PathBuf> {
    Ok(askdb_dir()?.join("config.json"))
}

/// Resolve a configured path: absolute paths are kept, relative ones are
/// taken relative to the current working directory.
pub fn resolve_path(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> AppResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

/// Get the askdb directory, creating if it doesn't exist
pub fn ensure_askdb_dir() -> AppResult<PathBuf> {
    let path = askdb_dir()?;
    ensure_dir(&path)?;
    Ok(path)
}
