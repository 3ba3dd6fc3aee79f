use crate::config::BridgeConfig;
use crate::errors::{CameraError, CommandError};
use std::sync::{Arc, RwLock};
use tauri::command;

lazy_static::lazy_static! {
    static ref GLOBAL_CONFIG: Arc<RwLock<BridgeConfig>> = Arc::new(RwLock::new(BridgeConfig::load_or_default()));
}

/// Snapshot of the process-wide configuration
pub fn current_config() -> BridgeConfig {
    GLOBAL_CONFIG
        .read()
        .map(|config| config.clone())
        .unwrap_or_default()
}

fn store(new_config: BridgeConfig) -> Result<(), CommandError> {
    {
        let mut config = GLOBAL_CONFIG
            .write()
            .map_err(|e| CameraError::InitializationError(format!("Failed to write config: {}", e)))?;
        *config = new_config.clone();
    }

    super::camera::global_bridge().set_config(new_config.clone())?;

    new_config.save_to_file(BridgeConfig::default_path())?;
    Ok(())
}

/// Get the current configuration
#[command]
pub async fn get_config() -> Result<BridgeConfig, CommandError> {
    Ok(current_config())
}

/// Update configuration
#[command]
pub async fn update_config(new_config: BridgeConfig) -> Result<(), CommandError> {
    new_config
        .validate()
        .map_err(CameraError::InvalidArgument)?;

    store(new_config)?;
    log::info!("Configuration updated");
    Ok(())
}

/// Reset configuration to defaults
#[command]
pub async fn reset_config() -> Result<BridgeConfig, CommandError> {
    let default_config = BridgeConfig::default();
    store(default_config.clone())?;
    log::info!("Configuration reset to defaults");
    Ok(default_config)
}
