//! Platform seam: camera service, capture sessions, texture registry and USB
//! listing, plus the native desktop backends that implement them.

pub mod nokhwa_camera;
pub mod pixel_texture;
pub mod usb;

use crate::errors::CameraError;
use crate::session::ExecutorHandle;
use crate::types::{CaptureRequest, LensFacing, Platform, SurfaceHandle, UsbDeviceInfo};
use std::sync::Arc;

pub use nokhwa_camera::NokhwaCameraService;
pub use pixel_texture::{PixelBufferRegistry, PixelBufferTexture};
pub use usb::RusbUsbManager;

/// Outcome of an asynchronous camera open
pub enum DeviceStateEvent {
    Opened(Box<dyn CameraDevice>),
    Disconnected,
    Error(i32),
}

impl std::fmt::Debug for DeviceStateEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStateEvent::Opened(device) => write!(f, "Opened({})", device.id()),
            DeviceStateEvent::Disconnected => write!(f, "Disconnected"),
            DeviceStateEvent::Error(code) => write!(f, "Error({})", code),
        }
    }
}

type StateHandler = Arc<dyn Fn(DeviceStateEvent) + Send + Sync>;

/// Delivers device state changes onto the session's background context.
///
/// Backends keep a clone for as long as the device may report state; events
/// delivered after the context stopped run inline on the caller's thread.
#[derive(Clone)]
pub struct DeviceStateCallback {
    executor: Option<ExecutorHandle>,
    handler: StateHandler,
}

impl DeviceStateCallback {
    pub fn new<F>(executor: Option<ExecutorHandle>, handler: F) -> Self
    where
        F: Fn(DeviceStateEvent) + Send + Sync + 'static,
    {
        Self {
            executor,
            handler: Arc::new(handler),
        }
    }

    pub fn on_opened(&self, device: Box<dyn CameraDevice>) {
        self.deliver(DeviceStateEvent::Opened(device));
    }

    pub fn on_disconnected(&self) {
        self.deliver(DeviceStateEvent::Disconnected);
    }

    pub fn on_error(&self, code: i32) {
        self.deliver(DeviceStateEvent::Error(code));
    }

    pub fn deliver(&self, event: DeviceStateEvent) {
        let handler = self.handler.clone();
        let job: crate::session::Job = Box::new(move || handler(event));

        let job = match &self.executor {
            Some(executor) => match executor.post(job) {
                Ok(()) => return,
                Err(job) => job,
            },
            None => job,
        };

        log::debug!("Background context gone, running device callback inline");
        job();
    }
}

/// Camera enumeration and open
pub trait CameraService: Send + Sync {
    fn camera_id_list(&self) -> Result<Vec<String>, CameraError>;

    fn lens_facing(&self, _camera_id: &str) -> Result<LensFacing, CameraError> {
        Ok(LensFacing::Unknown)
    }

    /// Start opening a camera. Synchronous failures are returned directly;
    /// everything after that is reported through `callback`.
    fn open_camera(&self, camera_id: &str, callback: DeviceStateCallback)
        -> Result<(), CameraError>;
}

/// An opened camera
pub trait CameraDevice: Send {
    fn id(&self) -> &str;

    fn create_capture_session(
        &mut self,
        outputs: &[SurfaceHandle],
    ) -> Result<Box<dyn CaptureSession>, CameraError>;

    fn close(&mut self) -> Result<(), CameraError>;
}

/// A configured capture session bound to output surfaces
pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError>;

    fn close(&mut self) -> Result<(), CameraError>;
}

/// Allocator of renderable surfaces
pub trait TextureRegistry: Send + Sync {
    fn create_surface_texture(&self) -> Result<Box<dyn SurfaceTexture>, CameraError>;
}

/// A renderable buffer identified by an integer id
pub trait SurfaceTexture: Send {
    fn id(&self) -> i64;

    fn set_default_buffer_size(&mut self, width: u32, height: u32);

    fn handle(&self) -> SurfaceHandle;

    fn release(&mut self) -> Result<(), CameraError>;
}

/// USB peripheral listing
pub trait UsbManager: Send + Sync {
    fn device_list(&self) -> Result<Vec<UsbDeviceInfo>, CameraError>;
}

/// The set of platform services a bridge runs against
#[derive(Clone)]
pub struct PlatformBackend {
    pub cameras: Arc<dyn CameraService>,
    pub textures: Arc<dyn TextureRegistry>,
    pub usb: Arc<dyn UsbManager>,
}

impl PlatformBackend {
    pub fn new(
        cameras: Arc<dyn CameraService>,
        textures: Arc<dyn TextureRegistry>,
        usb: Arc<dyn UsbManager>,
    ) -> Self {
        Self {
            cameras,
            textures,
            usb,
        }
    }

    /// Desktop backend: nokhwa cameras drawing into software pixel buffers
    pub fn native() -> (Self, PixelBufferRegistry) {
        let registry = PixelBufferRegistry::new();
        let backend = Self {
            cameras: Arc::new(NokhwaCameraService::new(registry.clone())),
            textures: Arc::new(registry.clone()),
            usb: Arc::new(RusbUsbManager::new()),
        };
        (backend, registry)
    }
}

/// Platform information
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub camera_backend: String,
    pub usb_backend: String,
}

impl PlatformInfo {
    pub fn current() -> Self {
        Self {
            platform: Platform::current(),
            camera_backend: "nokhwa".to_string(),
            usb_backend: "libusb".to_string(),
        }
    }
}
