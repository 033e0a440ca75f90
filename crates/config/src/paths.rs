//! Path utilities

use std::path::PathBuf;

/// Data directory (~/.handoff), falling back to a relative path without a home
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".handoff"))
        .unwrap_or_else(|| PathBuf::from(".handoff"))
}

/// Config file location
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}
