//! In-memory platform that records every call the bridge makes
//!
//! `MockPlatform` implements all three platform services. Tests configure the
//! camera ids, USB inventory and open behaviour, then inspect the ledger to
//! see which handles, sessions and surfaces are still alive.

use crate::errors::CameraError;
use crate::platform::{
    CameraDevice, CameraService, CaptureSession, DeviceStateCallback, PlatformBackend,
    SurfaceTexture, TextureRegistry, UsbManager,
};
use crate::types::{CaptureRequest, LensFacing, SurfaceHandle, UsbDeviceInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// How `open_camera` behaves
#[derive(Debug, Clone, PartialEq)]
pub enum OpenBehavior {
    /// Deliver `Opened` from another thread right away
    Succeed,
    /// Deliver `Opened` after a delay
    SucceedAfter(Duration),
    /// Never call back; tests can fire the stored callback later
    Never,
    /// Fail synchronously with a permission error
    Deny,
    /// Fail synchronously with an access error
    AccessFail,
    /// Deliver `Disconnected` instead of opening
    Disconnect,
    /// Deliver `Error(code)` instead of opening
    FailWith(i32),
}

/// A commit of a repeating request, with the thread it ran on
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedRequest {
    pub camera_id: String,
    pub request: CaptureRequest,
    pub thread_name: Option<String>,
}

#[derive(Default)]
struct Ledger {
    open_calls: Vec<String>,
    callbacks: Vec<(String, DeviceStateCallback)>,
    surfaces: Vec<(i64, u32, u32)>,
    live_surfaces: Vec<i64>,
    live_devices: Vec<String>,
    live_sessions: usize,
    committed: Vec<CommittedRequest>,
}

struct MockState {
    camera_ids: Result<Vec<String>, CameraError>,
    lens_facing: HashMap<String, LensFacing>,
    usb_devices: Result<Vec<UsbDeviceInfo>, CameraError>,
    open_behavior: OpenBehavior,
    fail_configure: bool,
    fail_commit: bool,
    fail_surface: bool,
    list_delay: Option<Duration>,
}

struct MockInner {
    state: Mutex<MockState>,
    ledger: Mutex<Ledger>,
    next_surface_id: AtomicI64,
}

/// Mock camera service, texture registry and USB manager in one
#[derive(Clone)]
pub struct MockPlatform {
    inner: Arc<MockInner>,
}

impl MockPlatform {
    /// One camera with id `"0"`, no USB devices, opens succeed
    pub fn new() -> Self {
        Self::with_cameras(&["0"])
    }

    pub fn with_cameras(ids: &[&str]) -> Self {
        Self {
            inner: Arc::new(MockInner {
                state: Mutex::new(MockState {
                    camera_ids: Ok(ids.iter().map(|id| id.to_string()).collect()),
                    lens_facing: HashMap::new(),
                    usb_devices: Ok(Vec::new()),
                    open_behavior: OpenBehavior::Succeed,
                    fail_configure: false,
                    fail_commit: false,
                    fail_surface: false,
                    list_delay: None,
                }),
                ledger: Mutex::new(Ledger::default()),
                next_surface_id: AtomicI64::new(100),
            }),
        }
    }

    pub fn backend(&self) -> PlatformBackend {
        PlatformBackend::new(
            Arc::new(self.clone()),
            Arc::new(self.clone()),
            Arc::new(self.clone()),
        )
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.inner.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_camera_ids(&self, ids: &[&str]) {
        self.state().camera_ids = Ok(ids.iter().map(|id| id.to_string()).collect());
    }

    pub fn set_camera_list_error(&self, error: CameraError) {
        self.state().camera_ids = Err(error);
    }

    pub fn set_lens_facing(&self, camera_id: &str, facing: LensFacing) {
        self.state()
            .lens_facing
            .insert(camera_id.to_string(), facing);
    }

    pub fn set_usb_devices(&self, devices: Vec<UsbDeviceInfo>) {
        self.state().usb_devices = Ok(devices);
    }

    pub fn set_usb_error(&self, error: CameraError) {
        self.state().usb_devices = Err(error);
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        self.state().open_behavior = behavior;
    }

    pub fn set_fail_configure(&self, fail: bool) {
        self.state().fail_configure = fail;
    }

    /// Make `set_repeating_request` on live capture sessions fail
    pub fn set_fail_commit(&self, fail: bool) {
        self.state().fail_commit = fail;
    }

    /// Make `camera_id_list` block for `delay`, like a slow system query
    pub fn set_camera_list_delay(&self, delay: Duration) {
        self.state().list_delay = Some(delay);
    }

    pub fn set_fail_surface(&self, fail: bool) {
        self.state().fail_surface = fail;
    }

    pub fn open_calls(&self) -> Vec<String> {
        self.ledger().open_calls.clone()
    }

    /// Every surface ever created, with its last buffer size
    pub fn surfaces_created(&self) -> Vec<(i64, u32, u32)> {
        self.ledger().surfaces.clone()
    }

    pub fn live_surfaces(&self) -> Vec<i64> {
        self.ledger().live_surfaces.clone()
    }

    pub fn live_devices(&self) -> Vec<String> {
        self.ledger().live_devices.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.ledger().live_sessions
    }

    pub fn committed_requests(&self) -> Vec<CommittedRequest> {
        self.ledger().committed.clone()
    }

    /// Simulate the platform opening the camera from the most recent
    /// `open_camera` call, regardless of the configured behaviour
    pub fn fire_opened(&self) -> bool {
        let Some((camera_id, callback)) = self.last_callback() else {
            return false;
        };
        callback.on_opened(Box::new(self.new_device(&camera_id)));
        true
    }

    /// Like `fire_opened`, for the `index`-th `open_camera` call
    pub fn fire_opened_at(&self, index: usize) -> bool {
        let Some((camera_id, callback)) = self.ledger().callbacks.get(index).cloned() else {
            return false;
        };
        callback.on_opened(Box::new(self.new_device(&camera_id)));
        true
    }

    pub fn fire_disconnected(&self) -> bool {
        let Some((_, callback)) = self.last_callback() else {
            return false;
        };
        callback.on_disconnected();
        true
    }

    pub fn fire_error(&self, code: i32) -> bool {
        let Some((_, callback)) = self.last_callback() else {
            return false;
        };
        callback.on_error(code);
        true
    }

    fn last_callback(&self) -> Option<(String, DeviceStateCallback)> {
        self.ledger().callbacks.last().cloned()
    }

    fn new_device(&self, camera_id: &str) -> MockCameraDevice {
        self.ledger().live_devices.push(camera_id.to_string());
        MockCameraDevice {
            id: camera_id.to_string(),
            platform: self.clone(),
            closed: false,
        }
    }
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraService for MockPlatform {
    fn camera_id_list(&self) -> Result<Vec<String>, CameraError> {
        let delay = self.state().list_delay;
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        self.state().camera_ids.clone()
    }

    fn lens_facing(&self, camera_id: &str) -> Result<LensFacing, CameraError> {
        Ok(self
            .state()
            .lens_facing
            .get(camera_id)
            .copied()
            .unwrap_or(LensFacing::Unknown))
    }

    fn open_camera(
        &self,
        camera_id: &str,
        callback: DeviceStateCallback,
    ) -> Result<(), CameraError> {
        let behavior = self.state().open_behavior.clone();
        {
            let mut ledger = self.ledger();
            ledger.open_calls.push(camera_id.to_string());
            ledger
                .callbacks
                .push((camera_id.to_string(), callback.clone()));
        }

        match behavior {
            OpenBehavior::Deny => Err(CameraError::PermissionDenied(
                "Camera permission not granted".to_string(),
            )),
            OpenBehavior::AccessFail => Err(CameraError::AccessFailed(format!(
                "Camera {} is in use",
                camera_id
            ))),
            OpenBehavior::Never => Ok(()),
            OpenBehavior::Succeed => {
                let device = self.new_device(camera_id);
                std::thread::spawn(move || callback.on_opened(Box::new(device)));
                Ok(())
            }
            OpenBehavior::SucceedAfter(delay) => {
                let device = self.new_device(camera_id);
                std::thread::spawn(move || {
                    std::thread::sleep(delay);
                    callback.on_opened(Box::new(device));
                });
                Ok(())
            }
            OpenBehavior::Disconnect => {
                std::thread::spawn(move || callback.on_disconnected());
                Ok(())
            }
            OpenBehavior::FailWith(code) => {
                std::thread::spawn(move || callback.on_error(code));
                Ok(())
            }
        }
    }
}

pub struct MockCameraDevice {
    id: String,
    platform: MockPlatform,
    closed: bool,
}

impl CameraDevice for MockCameraDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: &[SurfaceHandle],
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        if self.closed {
            return Err(CameraError::ConfigurationFailed(
                "Device is closed".to_string(),
            ));
        }
        if self.platform.state().fail_configure {
            return Err(CameraError::ConfigurationFailed(
                "Session configuration rejected".to_string(),
            ));
        }
        if outputs.is_empty() {
            return Err(CameraError::ConfigurationFailed(
                "No output surfaces".to_string(),
            ));
        }

        self.platform.ledger().live_sessions += 1;
        Ok(Box::new(MockCaptureSession {
            camera_id: self.id.clone(),
            platform: self.platform.clone(),
            closed: false,
        }))
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut ledger = self.platform.ledger();
        if let Some(pos) = ledger.live_devices.iter().position(|id| *id == self.id) {
            ledger.live_devices.remove(pos);
        }
        Ok(())
    }
}

pub struct MockCaptureSession {
    camera_id: String,
    platform: MockPlatform,
    closed: bool,
}

impl CaptureSession for MockCaptureSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError> {
        if self.closed {
            return Err(CameraError::ConfigurationFailed(
                "Session is closed".to_string(),
            ));
        }
        if self.platform.state().fail_commit {
            return Err(CameraError::ConfigurationFailed(
                "Repeating request rejected".to_string(),
            ));
        }
        self.platform.ledger().committed.push(CommittedRequest {
            camera_id: self.camera_id.clone(),
            request: request.clone(),
            thread_name: std::thread::current().name().map(str::to_string),
        });
        Ok(())
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.platform.ledger().live_sessions -= 1;
        Ok(())
    }
}

impl TextureRegistry for MockPlatform {
    fn create_surface_texture(&self) -> Result<Box<dyn SurfaceTexture>, CameraError> {
        if self.state().fail_surface {
            return Err(CameraError::SurfaceError(
                "Texture registry exhausted".to_string(),
            ));
        }
        let id = self.inner.next_surface_id.fetch_add(1, Ordering::SeqCst);
        {
            let mut ledger = self.ledger();
            ledger.surfaces.push((id, 0, 0));
            ledger.live_surfaces.push(id);
        }
        Ok(Box::new(MockSurface {
            id,
            width: 0,
            height: 0,
            platform: self.clone(),
            released: false,
        }))
    }
}

pub struct MockSurface {
    id: i64,
    width: u32,
    height: u32,
    platform: MockPlatform,
    released: bool,
}

impl SurfaceTexture for MockSurface {
    fn id(&self) -> i64 {
        self.id
    }

    fn set_default_buffer_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        let mut ledger = self.platform.ledger();
        if let Some(entry) = ledger.surfaces.iter_mut().find(|s| s.0 == self.id) {
            entry.1 = width;
            entry.2 = height;
        }
    }

    fn handle(&self) -> SurfaceHandle {
        SurfaceHandle {
            texture_id: self.id,
            width: self.width,
            height: self.height,
        }
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.platform.ledger().live_surfaces.retain(|id| *id != self.id);
        Ok(())
    }
}

impl UsbManager for MockPlatform {
    fn device_list(&self) -> Result<Vec<UsbDeviceInfo>, CameraError> {
        self.state().usb_devices.clone()
    }
}
