use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CameraError {
    #[error("No camera found")]
    NoCameraAvailable,
    #[error("Permission denied error: {0}")]
    PermissionDenied(String),
    #[error("Camera access error: {0}")]
    AccessFailed(String),
    #[error("Camera open timed out after {0} ms")]
    OpenTimeout(u64),
    #[error("Another preview session is already starting")]
    SessionBusy,
    #[error("Camera disconnected")]
    Disconnected,
    #[error("Camera device error (code {0})")]
    DeviceError(i32),
    #[error("Preview cancelled before the camera opened")]
    PreviewCancelled,
    #[error("Capture session configuration failed: {0}")]
    ConfigurationFailed(String),
    #[error("Surface error: {0}")]
    SurfaceError(String),
    #[error("USB enumeration error: {0}")]
    UsbError(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Camera initialization error: {0}")]
    InitializationError(String),
}

impl CameraError {
    /// Stable error code sent across the command channel
    pub fn code(&self) -> &'static str {
        match self {
            CameraError::NoCameraAvailable => "NO_CAMERA",
            CameraError::PermissionDenied(_) => "PERMISSION_DENIED",
            CameraError::AccessFailed(_) => "CAMERA_ACCESS",
            CameraError::OpenTimeout(_) => "CAMERA_OPEN_TIMEOUT",
            CameraError::SessionBusy => "SESSION_BUSY",
            CameraError::Disconnected => "CAMERA_DISCONNECTED",
            CameraError::DeviceError(_) => "CAMERA_ERROR",
            CameraError::PreviewCancelled => "PREVIEW_CANCELLED",
            CameraError::ConfigurationFailed(_) => "CONFIGURE_FAILED",
            CameraError::SurfaceError(_) => "SURFACE_ERROR",
            CameraError::UsbError(_) => "ENUM_FAILED",
            CameraError::InvalidArgument(_) => "INVALID_ARGUMENT",
            CameraError::InitializationError(_) => "INIT_FAILED",
        }
    }
}

/// Error payload returned by Tauri commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandError {
    pub code: String,
    pub message: String,
}

impl From<CameraError> for CommandError {
    fn from(error: CameraError) -> Self {
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for CommandError {}
