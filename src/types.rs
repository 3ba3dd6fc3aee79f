//! Core data types shared by the bridge, the command channel and the
//! platform backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Preview surfaces always use this buffer size
pub const PREVIEW_WIDTH: u32 = 640;
pub const PREVIEW_HEIGHT: u32 = 480;

/// Host platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Platform {
    Windows,
    MacOS,
    Linux,
    Android,
    Unknown,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Windows => "windows",
            Platform::MacOS => "macos",
            Platform::Linux => "linux",
            Platform::Android => "android",
            Platform::Unknown => "unknown",
        }
    }
}

/// A USB peripheral as reported by the USB manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsbDeviceInfo {
    pub name: String,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceInfo {
    pub fn new(name: impl Into<String>, vendor_id: u16, product_id: u16) -> Self {
        Self {
            name: name.into(),
            vendor_id,
            product_id,
        }
    }

    /// `"<name> (VID:<vendorId> PID:<productId>)"`, ids in decimal
    pub fn descriptor(&self) -> String {
        format!(
            "{} (VID:{} PID:{})",
            self.name, self.vendor_id, self.product_id
        )
    }
}

/// Which way a camera faces, used by the `prefer_external` selection policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LensFacing {
    Front,
    Back,
    External,
    Unknown,
}

/// Capture request templates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaptureTemplate {
    Preview,
}

/// Auto-focus modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AfMode {
    Off,
    Auto,
    ContinuousVideo,
    ContinuousPicture,
}

/// Image controls settable from the UI layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CameraControl {
    Brightness,
    Contrast,
}

impl CameraControl {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraControl::Brightness => "brightness",
            CameraControl::Contrast => "contrast",
        }
    }
}

/// Normalized control values, each in `[-1.0, 1.0]` with 0.0 meaning unchanged
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ControlValues {
    pub brightness: f64,
    pub contrast: f64,
}

impl ControlValues {
    pub fn set(&mut self, control: CameraControl, value: f64) {
        match control {
            CameraControl::Brightness => self.brightness = value,
            CameraControl::Contrast => self.contrast = value,
        }
    }

    pub fn get(&self, control: CameraControl) -> f64 {
        match control {
            CameraControl::Brightness => self.brightness,
            CameraControl::Contrast => self.contrast,
        }
    }
}

/// Lightweight reference to a surface target that backends can route frames to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceHandle {
    pub texture_id: i64,
    pub width: u32,
    pub height: u32,
}

/// A repeating capture request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureRequest {
    pub template: CaptureTemplate,
    pub targets: Vec<SurfaceHandle>,
    pub af_mode: AfMode,
    pub controls: ControlValues,
}

impl CaptureRequest {
    pub fn new(template: CaptureTemplate) -> Self {
        Self {
            template,
            targets: Vec::new(),
            af_mode: AfMode::Off,
            controls: ControlValues::default(),
        }
    }

    pub fn add_target(mut self, target: SurfaceHandle) -> Self {
        self.targets.push(target);
        self
    }

    pub fn with_af_mode(mut self, af_mode: AfMode) -> Self {
        self.af_mode = af_mode;
        self
    }

    pub fn with_controls(mut self, controls: ControlValues) -> Self {
        self.controls = controls;
        self
    }
}

/// Per-call options for `start_preview`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewOptions {
    /// Pick the n-th enumerated camera instead of applying the selection policy
    pub index: Option<usize>,
}

impl PreviewOptions {
    pub fn with_index(index: usize) -> Self {
        Self { index: Some(index) }
    }
}

/// Preview lifecycle phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Opening,
    Streaming,
    Failed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Opening => "opening",
            SessionPhase::Streaming => "streaming",
            SessionPhase::Failed => "failed",
        }
    }
}

/// What happened to a preview session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeEventKind {
    Streaming { surface_id: i64, camera_id: String },
    Disconnected { camera_id: String },
    DeviceError { camera_id: String, code: i32 },
    ConfigureFailed { camera_id: String, reason: String },
    OpenTimeout { camera_id: String, timeout_ms: u64 },
    Closed,
}

/// Notification pushed to the UI layer outside the request/response flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEvent {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: BridgeEventKind,
}

impl BridgeEvent {
    pub fn new(session_id: impl Into<String>, kind: BridgeEventKind) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

/// Snapshot of a pixel-buffer texture handed to the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PixelBuffer {
    pub texture_id: i64,
    pub width: u32,
    pub height: u32,
    /// RGBA8, row-major
    pub data: Vec<u8>,
    pub frame_count: u64,
}
