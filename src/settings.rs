//! Simulation settings
//!
//! Loaded from a JSON file next to the binary. Missing fields fall back to
//! their defaults so older files keep working.

use std::fs;
use std::path::Path;

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::consts::MAX_SUBSTEPS;
use crate::error::SettingsError;

/// Simulation configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimSettings {
    /// World width in world units
    pub world_width: f32,
    /// World height in world units
    pub world_height: f32,
    /// Seed for the shared network RNG
    pub seed: u64,

    // === Presentation ===
    /// Forward particle spawns to the effects layer
    pub particles: bool,

    // === Frame loop ===
    /// Fixed steps allowed per frame before time is dropped
    pub max_substeps: u32,
    /// Longest frame time fed to the accumulator (seconds)
    pub max_frame_time: f32,
}

impl Default for SimSettings {
    fn default() -> Self {
        Self {
            world_width: 1024.0,
            world_height: 1024.0,
            seed: 0,

            particles: true,

            max_substeps: MAX_SUBSTEPS,
            max_frame_time: 0.1,
        }
    }
}

impl SimSettings {
    pub fn with_seed(seed: u64) -> Self {
        Self {
            seed,
            ..Self::default()
        }
    }

    pub fn world_size(&self) -> Vec2 {
        Vec2::new(self.world_width, self.world_height)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.world_width > 0.0 && self.world_height > 0.0 {
            Ok(())
        } else {
            Err(SettingsError::WorldSize {
                width: self.world_width,
                height: self.world_height,
            })
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json(&self) -> Result<String, SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let settings = Self::from_json(&fs::read_to_string(path)?)?;
        log::info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file is missing or bad
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(settings) => settings,
            Err(err) => {
                log::info!("Using default settings ({err})");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("Settings saved");
        Ok(())
    }
}
