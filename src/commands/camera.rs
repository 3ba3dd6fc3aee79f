use crate::bridge::CameraBridge;
use crate::errors::{CameraError, CommandError};
use crate::permissions::{check_permission, PermissionInfo};
use crate::platform::{PixelBufferRegistry, PlatformInfo};
use crate::types::{CameraControl, PixelBuffer, PreviewOptions, SessionPhase};
use tauri::command;

lazy_static::lazy_static! {
    static ref NATIVE_BRIDGE: (CameraBridge, PixelBufferRegistry) =
        CameraBridge::native(super::config::current_config());
}

/// The bridge shared by every command
pub fn global_bridge() -> &'static CameraBridge {
    &NATIVE_BRIDGE.0
}

/// Pixel buffers the native backend draws into
pub fn global_textures() -> &'static PixelBufferRegistry {
    &NATIVE_BRIDGE.1
}

/// List attached USB peripherals as descriptor strings
#[command]
pub async fn enumerate_devices() -> Result<Vec<String>, CommandError> {
    let devices = tokio::task::spawn_blocking(|| global_bridge().enumerate_devices())
        .await
        .map_err(|e| CameraError::UsbError(format!("Task join error: {}", e)))?;
    log::info!("Enumerated {} devices", devices.len());
    Ok(devices)
}

/// Open a camera and start streaming into a new surface; returns its id
#[command]
pub async fn start_preview(index: Option<usize>) -> Result<i64, CommandError> {
    let options = PreviewOptions { index };
    match global_bridge().start_preview(options).await {
        Ok(surface_id) => {
            log::info!("Preview started on surface {}", surface_id);
            Ok(surface_id)
        }
        Err(e) => {
            log::error!("Failed to start preview: {}", e);
            Err(e.into())
        }
    }
}

/// Stop the preview and release everything it holds
#[command]
pub async fn close_device() -> Result<(), CommandError> {
    if let Err(e) = tokio::task::spawn_blocking(|| global_bridge().close_device()).await {
        log::warn!("close_device task failed: {}", e);
    }
    Ok(())
}

#[command]
pub async fn set_brightness(value: f64) -> Result<(), CommandError> {
    global_bridge()
        .set_control(CameraControl::Brightness, value)
        .map_err(CommandError::from)
}

#[command]
pub async fn set_contrast(value: f64) -> Result<(), CommandError> {
    global_bridge()
        .set_control(CameraControl::Contrast, value)
        .map_err(CommandError::from)
}

#[command]
pub async fn get_session_phase() -> Result<SessionPhase, CommandError> {
    Ok(global_bridge().phase())
}

/// Latest frame of a preview surface, `None` before the first frame
#[command]
pub async fn copy_pixel_buffer(texture_id: i64) -> Result<Option<PixelBuffer>, CommandError> {
    if global_textures().lookup(texture_id).is_none() {
        return Err(CameraError::SurfaceError(format!("Unknown texture {}", texture_id)).into());
    }
    Ok(global_textures().copy_pixel_buffer(texture_id))
}

#[command]
pub async fn get_platform_info() -> Result<PlatformInfo, CommandError> {
    let info = PlatformInfo::current();
    log::info!(
        "Platform: {} using {}",
        info.platform.as_str(),
        info.camera_backend
    );
    Ok(info)
}

#[command]
pub async fn get_permission_status() -> Result<PermissionInfo, CommandError> {
    let info = check_permission();
    log::info!("Camera permission: {}", info.status);
    Ok(info)
}
