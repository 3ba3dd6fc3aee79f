//! Desktop camera service built on nokhwa
//!
//! Cameras open on a helper thread and report back through the session's
//! `DeviceStateCallback`. A capture session routes decoded frames into the
//! pixel-buffer texture named by its output surface.

use crate::errors::CameraError;
use crate::permissions;
use crate::platform::pixel_texture::{PixelBufferRegistry, PixelBufferTarget};
use crate::platform::{CameraDevice, CameraService, CaptureSession, DeviceStateCallback};
use crate::types::{CaptureRequest, ControlValues, LensFacing, SurfaceHandle};
use image::RgbImage;
use nokhwa::{
    pixel_format::RgbFormat,
    query,
    utils::{ApiBackend, CameraIndex, RequestedFormat, RequestedFormatType},
    Buffer, CallbackCamera,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Error code reported through `DeviceStateCallback::on_error` when the
/// camera fails to open
pub const ERROR_CAMERA_DEVICE: i32 = 4;

/// Where decoded frames go while a repeating request is active
struct FrameSink {
    target: Arc<PixelBufferTarget>,
    controls: ControlValues,
}

type SharedSink = Arc<Mutex<Option<FrameSink>>>;

pub struct NokhwaCameraService {
    registry: PixelBufferRegistry,
}

impl NokhwaCameraService {
    pub fn new(registry: PixelBufferRegistry) -> Self {
        Self { registry }
    }

    fn query_cameras() -> Result<Vec<nokhwa::utils::CameraInfo>, CameraError> {
        query(ApiBackend::Auto)
            .map_err(|e| CameraError::AccessFailed(format!("Failed to query cameras: {}", e)))
    }
}

impl CameraService for NokhwaCameraService {
    fn camera_id_list(&self) -> Result<Vec<String>, CameraError> {
        let cameras = Self::query_cameras()?;
        Ok(cameras.iter().map(|info| info.index().to_string()).collect())
    }

    fn lens_facing(&self, camera_id: &str) -> Result<LensFacing, CameraError> {
        let cameras = Self::query_cameras()?;
        let facing = cameras
            .iter()
            .find(|info| info.index().to_string() == camera_id)
            .map(|info| {
                let text = format!("{} {}", info.human_name(), info.description()).to_lowercase();
                if text.contains("usb") || text.contains("uvc") {
                    LensFacing::External
                } else {
                    LensFacing::Unknown
                }
            })
            .unwrap_or(LensFacing::Unknown);
        Ok(facing)
    }

    fn open_camera(
        &self,
        camera_id: &str,
        callback: DeviceStateCallback,
    ) -> Result<(), CameraError> {
        let permission = permissions::check_permission();
        if permission.status.blocks_open() {
            return Err(CameraError::PermissionDenied(permission.message));
        }

        let index = camera_id.parse::<u32>().map_err(|_| {
            CameraError::AccessFailed(format!("Invalid camera id '{}'", camera_id))
        })?;

        if !self.camera_id_list()?.iter().any(|id| id == camera_id) {
            return Err(CameraError::AccessFailed(format!(
                "Camera {} is not connected",
                camera_id
            )));
        }

        let registry = self.registry.clone();
        let id = camera_id.to_string();

        std::thread::Builder::new()
            .name(format!("camera-open-{}", camera_id))
            .spawn(move || {
                let sink: SharedSink = Arc::new(Mutex::new(None));
                let frame_sink = sink.clone();
                let requested = RequestedFormat::new::<RgbFormat>(RequestedFormatType::None);

                match CallbackCamera::new(CameraIndex::Index(index), requested, move |buffer| {
                    deliver_frame(&frame_sink, &buffer)
                }) {
                    Ok(camera) => {
                        log::info!("Camera {} opened", id);
                        callback.on_opened(Box::new(NokhwaCameraDevice {
                            id,
                            camera: Arc::new(Mutex::new(camera)),
                            sink,
                            stream_open: Arc::new(AtomicBool::new(false)),
                            registry,
                        }));
                    }
                    Err(e) => {
                        log::error!("Failed to open camera {}: {}", id, e);
                        callback.on_error(ERROR_CAMERA_DEVICE);
                    }
                }
            })
            .map_err(|e| {
                CameraError::AccessFailed(format!("Failed to start camera open thread: {}", e))
            })?;

        Ok(())
    }
}

fn deliver_frame(sink: &SharedSink, buffer: &Buffer) {
    let Ok(guard) = sink.lock() else {
        return;
    };
    let Some(sink) = guard.as_ref() else {
        return;
    };

    let decoded = match buffer.decode_image::<RgbFormat>() {
        Ok(decoded) => decoded,
        Err(e) => {
            log::debug!("Dropping undecodable frame: {}", e);
            return;
        }
    };
    let (width, height) = (decoded.width(), decoded.height());
    let Some(mut frame) = RgbImage::from_raw(width, height, decoded.into_raw()) else {
        log::debug!("Dropping frame with inconsistent size {}x{}", width, height);
        return;
    };

    apply_controls(&mut frame, &sink.controls);
    if let Err(e) = sink.target.write_rgb(frame) {
        log::warn!("Failed to write frame to texture {}: {}", sink.target.texture_id(), e);
    }
}

/// Software brightness/contrast, both normalized to `[-1.0, 1.0]`
pub fn apply_controls(frame: &mut RgbImage, controls: &ControlValues) {
    if controls.brightness == 0.0 && controls.contrast == 0.0 {
        return;
    }
    let gain = 1.0 + controls.contrast;
    let offset = controls.brightness;
    for channel in frame.iter_mut() {
        let v = *channel as f64 / 255.0;
        let adjusted = (v - 0.5) * gain + 0.5 + offset;
        *channel = (adjusted.clamp(0.0, 1.0) * 255.0).round() as u8;
    }
}

pub struct NokhwaCameraDevice {
    id: String,
    camera: Arc<Mutex<CallbackCamera>>,
    sink: SharedSink,
    stream_open: Arc<AtomicBool>,
    registry: PixelBufferRegistry,
}

impl CameraDevice for NokhwaCameraDevice {
    fn id(&self) -> &str {
        &self.id
    }

    fn create_capture_session(
        &mut self,
        outputs: &[SurfaceHandle],
    ) -> Result<Box<dyn CaptureSession>, CameraError> {
        let output = outputs.first().ok_or_else(|| {
            CameraError::ConfigurationFailed("Capture session needs an output".to_string())
        })?;
        let target = self.registry.lookup(output.texture_id).ok_or_else(|| {
            CameraError::ConfigurationFailed(format!(
                "Surface {} is not a registered pixel buffer",
                output.texture_id
            ))
        })?;

        Ok(Box::new(NokhwaCaptureSession {
            camera: self.camera.clone(),
            sink: self.sink.clone(),
            stream_open: self.stream_open.clone(),
            target,
        }))
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = None;
        }
        stop_stream(&self.camera, &self.stream_open)?;
        log::info!("Camera {} closed", self.id);
        Ok(())
    }
}

pub struct NokhwaCaptureSession {
    camera: Arc<Mutex<CallbackCamera>>,
    sink: SharedSink,
    stream_open: Arc<AtomicBool>,
    target: Arc<PixelBufferTarget>,
}

impl CaptureSession for NokhwaCaptureSession {
    fn set_repeating_request(&mut self, request: &CaptureRequest) -> Result<(), CameraError> {
        log::debug!(
            "Repeating request {:?} af={:?} on texture {}",
            request.template,
            request.af_mode,
            self.target.texture_id()
        );

        {
            let mut sink = self.sink.lock().map_err(|_| {
                CameraError::ConfigurationFailed("Frame sink lock poisoned".to_string())
            })?;
            *sink = Some(FrameSink {
                target: self.target.clone(),
                controls: request.controls,
            });
        }

        if !self.stream_open.load(Ordering::SeqCst) {
            let mut camera = self.camera.lock().map_err(|_| {
                CameraError::ConfigurationFailed("Camera lock poisoned".to_string())
            })?;
            camera.open_stream().map_err(|e| {
                CameraError::ConfigurationFailed(format!("Failed to start stream: {}", e))
            })?;
            self.stream_open.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), CameraError> {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = None;
        }
        stop_stream(&self.camera, &self.stream_open)
    }
}

impl Drop for NokhwaCameraDevice {
    fn drop(&mut self) {
        if let Ok(mut sink) = self.sink.lock() {
            *sink = None;
        }
        let _ = stop_stream(&self.camera, &self.stream_open);
    }
}

// The camera handle is only touched through its mutex.
unsafe impl Send for NokhwaCameraDevice {}
unsafe impl Send for NokhwaCaptureSession {}

fn stop_stream(
    camera: &Arc<Mutex<CallbackCamera>>,
    stream_open: &AtomicBool,
) -> Result<(), CameraError> {
    if !stream_open.swap(false, Ordering::SeqCst) {
        return Ok(());
    }
    let mut camera = camera
        .lock()
        .map_err(|_| CameraError::AccessFailed("Camera lock poisoned".to_string()))?;
    camera
        .stop_stream()
        .map_err(|e| CameraError::AccessFailed(format!("Failed to stop stream: {}", e)))
}
