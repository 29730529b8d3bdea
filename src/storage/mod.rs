//! Storage module for configuration and saved shots.

pub mod config;
pub mod shots;

pub use config::{AppConfig, BleSettings, ConfigError, DrillSettings};
pub use shots::{ShotConfig, ShotStore, StoreError};
