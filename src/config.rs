//! Configuration management for the camera bridge
//!
//! Provides loading, saving and validation of the runtime options: how long
//! to wait for a camera to open, which camera to pick, and how many events
//! the notification channel buffers.

use crate::errors::CameraError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Root configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub preview: PreviewConfig,
    pub events: EventConfig,
}

/// Preview session configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// How long `start_preview` waits for the open callback, in milliseconds
    pub open_timeout_ms: u64,
    /// Camera selection policy
    pub camera_selection: CameraSelection,
}

/// Event channel configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventConfig {
    /// Events buffered per subscriber before the oldest are dropped
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CameraSelection {
    /// First enumerated camera id
    First,
    /// First camera reporting an external lens, else the first id
    PreferExternal,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            preview: PreviewConfig {
                open_timeout_ms: 5000,
                camera_selection: CameraSelection::First,
            },
            events: EventConfig { capacity: 32 },
        }
    }
}

impl BridgeConfig {
    /// Load configuration from TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, CameraError> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            CameraError::InitializationError(format!("Failed to read config file: {}", e))
        })?;

        let config: BridgeConfig = toml::from_str(&contents).map_err(|e| {
            CameraError::InitializationError(format!("Failed to parse config file: {}", e))
        })?;

        config
            .validate()
            .map_err(CameraError::InitializationError)?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), CameraError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                CameraError::InitializationError(format!(
                    "Failed to create config directory: {}",
                    e
                ))
            })?;
        }

        let toml_string = toml::to_string_pretty(self).map_err(|e| {
            CameraError::InitializationError(format!("Failed to serialize config: {}", e))
        })?;

        fs::write(path, toml_string).map_err(|e| {
            CameraError::InitializationError(format!("Failed to write config file: {}", e))
        })?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from("uvcbridge.toml")
    }

    /// Load from default location or fall back to defaults
    pub fn load_or_default() -> Self {
        Self::load_from_file(Self::default_path()).unwrap_or_else(|e| {
            log::warn!("Failed to load config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.preview.open_timeout_ms == 0 || self.preview.open_timeout_ms > 60_000 {
            return Err("Open timeout must be between 1 and 60000 ms".to_string());
        }
        if self.events.capacity == 0 || self.events.capacity > 1024 {
            return Err("Event capacity must be between 1 and 1024".to_string());
        }
        Ok(())
    }

    pub fn open_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.preview.open_timeout_ms)
    }
}
