//! Method-name command channel
//!
//! Dispatches `{ method, arguments }` calls from the UI onto the bridge and
//! shapes the result as a tagged response. Unknown methods answer
//! `not_implemented` rather than an error.

use crate::bridge::CameraBridge;
use crate::errors::CameraError;
use crate::types::{CameraControl, PreviewOptions};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CHANNEL_NAME: &str = "com.example.uvc_ir_viewer/camera";

pub const METHOD_ENUMERATE_DEVICES: &str = "enumerateDevices";
pub const METHOD_START_PREVIEW: &str = "startPreview";
pub const METHOD_CLOSE_DEVICE: &str = "closeDevice";
pub const METHOD_SET_BRIGHTNESS: &str = "setBrightness";
pub const METHOD_SET_CONTRAST: &str = "setContrast";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    pub fn without_arguments(method: impl Into<String>) -> Self {
        Self::new(method, Value::Null)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MethodResponse {
    Success {
        result: Value,
    },
    Error {
        code: String,
        message: String,
        details: Option<Value>,
    },
    NotImplemented,
}

impl MethodResponse {
    pub fn success<T: Serialize>(value: T) -> Self {
        match serde_json::to_value(value) {
            Ok(result) => MethodResponse::Success { result },
            Err(e) => MethodResponse::Error {
                code: "SERIALIZATION_FAILED".to_string(),
                message: e.to_string(),
                details: None,
            },
        }
    }

    pub fn from_error(error: CameraError) -> Self {
        MethodResponse::Error {
            code: error.code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MethodResponse::Success { .. })
    }

    /// Error code, if this is an error response
    pub fn error_code(&self) -> Option<&str> {
        match self {
            MethodResponse::Error { code, .. } => Some(code),
            _ => None,
        }
    }
}

impl From<Result<(), CameraError>> for MethodResponse {
    fn from(result: Result<(), CameraError>) -> Self {
        match result {
            Ok(()) => MethodResponse::success(Value::Null),
            Err(e) => MethodResponse::from_error(e),
        }
    }
}

/// Route one call to the bridge
pub async fn dispatch(bridge: &CameraBridge, call: MethodCall) -> MethodResponse {
    log::debug!("{} <- {}", CHANNEL_NAME, call.method);

    match call.method.as_str() {
        METHOD_ENUMERATE_DEVICES => {
            let bridge = bridge.clone();
            match tokio::task::spawn_blocking(move || bridge.enumerate_devices()).await {
                Ok(devices) => MethodResponse::success(devices),
                Err(e) => MethodResponse::from_error(CameraError::UsbError(format!(
                    "Task join error: {}",
                    e
                ))),
            }
        }
        METHOD_START_PREVIEW => {
            let options = match preview_options(&call.arguments) {
                Ok(options) => options,
                Err(e) => return MethodResponse::from_error(e),
            };
            match bridge.start_preview(options).await {
                Ok(surface_id) => MethodResponse::success(surface_id),
                Err(e) => {
                    log::error!("startPreview failed: {}", e);
                    MethodResponse::from_error(e)
                }
            }
        }
        METHOD_CLOSE_DEVICE => {
            let bridge = bridge.clone();
            if let Err(e) = tokio::task::spawn_blocking(move || bridge.close_device()).await {
                log::warn!("closeDevice task failed: {}", e);
            }
            MethodResponse::success(Value::Null)
        }
        METHOD_SET_BRIGHTNESS => set_control(bridge, CameraControl::Brightness, &call.arguments),
        METHOD_SET_CONTRAST => set_control(bridge, CameraControl::Contrast, &call.arguments),
        other => {
            log::debug!("Method '{}' is not implemented", other);
            MethodResponse::NotImplemented
        }
    }
}

fn preview_options(arguments: &Value) -> Result<PreviewOptions, CameraError> {
    let Some(index) = arguments.get("index") else {
        return Ok(PreviewOptions::default());
    };
    if index.is_null() {
        return Ok(PreviewOptions::default());
    }
    index
        .as_u64()
        .and_then(|i| usize::try_from(i).ok())
        .map(PreviewOptions::with_index)
        .ok_or_else(|| {
            CameraError::InvalidArgument(format!(
                "'index' must be a non-negative integer, got {}",
                index
            ))
        })
}

fn set_control(bridge: &CameraBridge, control: CameraControl, arguments: &Value) -> MethodResponse {
    let value = match arguments.get("value").and_then(Value::as_f64) {
        Some(value) => value,
        None => {
            return MethodResponse::from_error(CameraError::InvalidArgument(format!(
                "{} requires a numeric 'value'",
                control.as_str()
            )))
        }
    };
    bridge.set_control(control, value).into()
}
