//! Shot configurations and their persisted store.

use crate::protocol::{Command, ShotCommand, ShotParams};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Default wheel speed for records saved before per-wheel speeds existed.
const DEFAULT_WHEEL_SPEED: f64 = 127.0;

fn default_wheel_speed() -> f64 {
    DEFAULT_WHEEL_SPEED
}

/// One user-configured launch, keyed by shot number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShotConfig {
    /// Stable identifier
    pub id: Uuid,
    /// User-facing ordinal (1..N)
    pub shot_number: u32,
    /// First wheel speed (0-255)
    #[serde(default = "default_wheel_speed")]
    pub speed_a: f64,
    /// Second wheel speed (0-255)
    #[serde(default = "default_wheel_speed")]
    pub speed_b: f64,
    /// Combined speed used for both wheels in drills (0-255)
    #[serde(rename = "speedAB")]
    pub speed_ab: f64,
    /// Spin bias between the wheels
    #[serde(default)]
    pub spin_bias: f64,
    /// Delay between balls in milliseconds (0-2000)
    pub delay_e: f64,
    /// Horizontal target, one of a few discrete positions (0-255)
    pub target_d: f64,
    /// Vertical target, one of a few discrete positions (0-255)
    pub target_c: f64,
    /// Carriage X (0-255)
    pub target_f: f64,
    /// Carriage Y (0-255)
    pub target_g: f64,
    /// Rotation (0-255)
    pub target_h: f64,
    /// Balls per shot
    pub shots: u32,
    /// Seconds between repeats
    pub interval: u32,
    /// UI hint only
    #[serde(default)]
    pub is_running: bool,
}

impl ShotConfig {
    /// A centred, medium-speed shot.
    pub fn new(shot_number: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            shot_number,
            speed_a: DEFAULT_WHEEL_SPEED,
            speed_b: DEFAULT_WHEEL_SPEED,
            speed_ab: DEFAULT_WHEEL_SPEED,
            spin_bias: 0.0,
            delay_e: 1000.0,
            target_d: 127.0,
            target_c: 127.0,
            target_f: 127.0,
            target_g: 127.0,
            target_h: 127.5,
            shots: 1,
            interval: 2,
            is_running: false,
        }
    }

    /// Slider values with independent wheel speeds.
    pub fn params(&self) -> ShotParams {
        ShotParams {
            target_x: self.target_d,
            target_y: self.target_c,
            speed_1: self.speed_a,
            speed_2: self.speed_b,
            delay_ms: self.delay_e,
            carriage_x: self.target_f,
            carriage_y: self.target_g,
            rotation: self.target_h,
        }
    }

    /// Slider values with the combined speed driving both wheels.
    pub fn combined_speed_params(&self) -> ShotParams {
        ShotParams {
            speed_1: self.speed_ab,
            speed_2: self.speed_ab,
            ..self.params()
        }
    }

    /// Single-shot command for manual firing.
    pub fn to_command(&self) -> Command {
        Command::Shot(ShotCommand::encode(&self.params()))
    }

    /// Single-shot command as fired by a drill.
    pub fn to_drill_command(&self, per_wheel_speeds: bool) -> Command {
        let params = if per_wheel_speeds {
            self.params()
        } else {
            self.combined_speed_params()
        };
        Command::Shot(ShotCommand::encode(&params))
    }
}

/// Errors raised when persisting shots.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialize error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Shot {0} does not exist")]
    ShotNotFound(u32),

    #[error("No shot numbers left")]
    NumbersExhausted,
}

/// Shot number -> configuration, saved as JSON after every change.
#[derive(Debug)]
pub struct ShotStore {
    path: PathBuf,
    shots: BTreeMap<u32, ShotConfig>,
}

impl ShotStore {
    /// Open the store at `path`.
    ///
    /// A missing or unreadable file yields an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let shots = Self::load(&path);
        tracing::info!("Loaded {} shots from {}", shots.len(), path.display());
        Self { path, shots }
    }

    fn load(path: &Path) -> BTreeMap<u32, ShotConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                }
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(shots) => shots,
            Err(e) => {
                tracing::warn!("Discarding unreadable shot store {}: {}", path.display(), e);
                BTreeMap::new()
            }
        }
    }

    fn save(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let content = serde_json::to_string_pretty(&self.shots)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// One past the highest shot number in use, or `None` once `u32::MAX`
    /// is taken.
    pub fn next_shot_number(&self) -> Option<u32> {
        match self.shots.keys().next_back() {
            Some(max) => max.checked_add(1),
            None => Some(1),
        }
    }

    /// Add a shot under the next free number and return that number.
    ///
    /// On failure the store is left as it was.
    pub fn add(&mut self, mut config: ShotConfig) -> Result<u32, StoreError> {
        let number = self.next_shot_number().ok_or(StoreError::NumbersExhausted)?;
        config.shot_number = number;
        self.shots.insert(number, config);

        if let Err(e) = self.save() {
            self.shots.remove(&number);
            return Err(e);
        }

        tracing::debug!("Added shot {}", number);
        Ok(number)
    }

    /// Replace an existing shot, keyed by its shot number.
    ///
    /// On failure the previous version is kept.
    pub fn update(&mut self, config: ShotConfig) -> Result<(), StoreError> {
        let number = config.shot_number;
        let slot = self
            .shots
            .get_mut(&number)
            .ok_or(StoreError::ShotNotFound(number))?;
        let previous = std::mem::replace(slot, config);

        if let Err(e) = self.save() {
            self.shots.insert(number, previous);
            return Err(e);
        }
        Ok(())
    }

    /// Remove a shot. Remaining shots keep their numbers.
    pub fn delete(&mut self, shot_number: u32) -> Result<ShotConfig, StoreError> {
        let removed = self
            .shots
            .remove(&shot_number)
            .ok_or(StoreError::ShotNotFound(shot_number))?;

        if let Err(e) = self.save() {
            self.shots.insert(shot_number, removed);
            return Err(e);
        }

        tracing::debug!("Deleted shot {}", shot_number);
        Ok(removed)
    }

    pub fn get(&self, shot_number: u32) -> Option<&ShotConfig> {
        self.shots.get(&shot_number)
    }

    /// All shots ordered by shot number.
    pub fn sorted(&self) -> Vec<ShotConfig> {
        self.shots.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }
}
