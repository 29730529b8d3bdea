//! Application configuration loaded from TOML.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// BLE settings
    pub ble: BleSettings,
    /// Drill settings
    pub drill: DrillSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            ble: BleSettings::default(),
            drill: DrillSettings::default(),
        }
    }
}

impl AppConfig {
    /// Path of the persisted shot list.
    pub fn shots_path(&self) -> PathBuf {
        self.data_dir.join("shots.json")
    }
}

/// BLE-related settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BleSettings {
    /// Stop device discovery after this many seconds
    pub scan_timeout_secs: u32,
    /// Name fragment used to pick a device automatically
    pub device_name_filter: String,
}

impl Default for BleSettings {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 10,
            device_name_filter: "DragonBot".to_string(),
        }
    }
}

/// Drill-related settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrillSettings {
    /// Seconds between shots (1-10)
    pub interval_secs: u32,
    /// Number of passes over the shot list (1-99)
    pub loop_count: u32,
    /// Repeat until stopped
    pub infinite: bool,
    /// Fire each wheel at its own speed instead of the combined speed
    pub per_wheel_speeds: bool,
}

impl Default for DrillSettings {
    fn default() -> Self {
        Self {
            interval_secs: 2,
            loop_count: 1,
            infinite: false,
            per_wheel_speeds: false,
        }
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "dragonbot", "DragonBot")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load application configuration from `path`.
///
/// A missing file yields the defaults. The data directory is the file's
/// parent directory.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let data_dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(get_data_dir);

    if !path.exists() {
        return Ok(AppConfig {
            data_dir,
            ..Default::default()
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.data_dir = data_dir;

    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save application configuration to `path`.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),
}
