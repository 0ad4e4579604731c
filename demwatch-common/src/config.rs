//! Configuration loading and data folder resolution
//!
//! Resolution priority for the data folder:
//! 1. Environment variable (`DEMWATCH_DATA_DIR`)
//! 2. TOML config file (`data_dir` key)
//! 3. OS-dependent compiled default

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

/// Environment variable overriding the data folder
pub const DATA_DIR_ENV: &str = "DEMWATCH_DATA_DIR";

/// Environment variable overriding the config file path
pub const CONFIG_PATH_ENV: &str = "DEMWATCH_CONFIG";

/// Locate the platform config file for a service, e.g. `demwatch-tracker.toml`
///
/// Checks `DEMWATCH_CONFIG` first, then the user config dir
/// (`~/.config/demwatch/<service>.toml` on Linux), then
/// `/etc/demwatch/<service>.toml`.
pub fn config_file_path(service: &str) -> Option<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        return Some(PathBuf::from(path));
    }

    let file_name = format!("{service}.toml");

    if let Some(user_path) = dirs::config_dir().map(|d| d.join("demwatch").join(&file_name)) {
        if user_path.exists() {
            return Some(user_path);
        }
    }

    let system_path = PathBuf::from("/etc/demwatch").join(&file_name);
    if system_path.exists() {
        return Some(system_path);
    }

    None
}

/// Load and parse a TOML config file into a typed config struct
pub fn load_toml_config<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
}

/// Resolve the data folder: ENV → supplied TOML value → platform default
pub fn resolve_data_dir(toml_value: Option<&Path>) -> PathBuf {
    if let Ok(path) = std::env::var(DATA_DIR_ENV) {
        return PathBuf::from(path);
    }

    if let Some(path) = toml_value {
        return path.to_path_buf();
    }

    default_data_dir()
}

/// OS-dependent default data folder
fn default_data_dir() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/demwatch (or /var/lib/demwatch for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("demwatch"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/demwatch"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("demwatch"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/demwatch"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("demwatch"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\demwatch"))
    } else {
        PathBuf::from("./demwatch_data")
    }
}

/// Create the data folder (and artifact subfolder) if missing
pub fn ensure_data_dir(data_dir: &Path) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;
    std::fs::create_dir_all(data_dir.join("demos"))?;
    Ok(())
}
