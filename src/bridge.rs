//! Camera session bridge
//!
//! Owns the single preview session: device enumeration, the open/configure
//! sequence behind `start_preview`, best-effort teardown, and the event
//! channel that carries asynchronous outcomes back to the UI.
//!
//! The session lives in one tagged `SessionState` behind a mutex. Callbacks
//! from the camera stack run on the session's background context and carry
//! the generation they were issued for; a callback for a generation that is
//! no longer current only closes whatever device it delivered.

use crate::assert_invariant;
use crate::config::{BridgeConfig, CameraSelection};
use crate::errors::CameraError;
use crate::platform::{
    CameraDevice, CaptureSession, DeviceStateCallback, DeviceStateEvent, PixelBufferRegistry,
    PlatformBackend,
};
use crate::session::{
    release_session, BackgroundContext, OpeningSession, SessionState, StreamingSession,
};
use crate::types::{
    AfMode, BridgeEvent, BridgeEventKind, CameraControl, CaptureRequest, CaptureTemplate,
    ControlValues, LensFacing, PreviewOptions, SessionPhase, PREVIEW_HEIGHT, PREVIEW_WIDTH,
};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tokio::sync::{broadcast, oneshot};

/// Name of the per-session background thread
pub const BACKGROUND_THREAD_NAME: &str = "CameraBackground";

struct BridgeInner {
    backend: PlatformBackend,
    config: RwLock<BridgeConfig>,
    state: Mutex<SessionState>,
    starting: AtomicBool,
    generation: AtomicU64,
    /// Bumped by every `close_device`; a start that sees it move is cancelled
    close_requests: AtomicU64,
    live_contexts: Arc<AtomicUsize>,
    controls: Mutex<ControlValues>,
    events: broadcast::Sender<BridgeEvent>,
}

impl BridgeInner {
    fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn controls(&self) -> ControlValues {
        *self.controls.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn emit(&self, session_id: &str, kind: BridgeEventKind) {
        log::debug!("Bridge event for session {}: {:?}", session_id, kind);
        // No subscribers is not an error
        let _ = self.events.send(BridgeEvent::new(session_id, kind));
    }

    /// Take the session out of the slot if it still belongs to `generation`
    fn take_generation(&self, generation: u64) -> SessionState {
        let mut state = self.lock_state();
        if state.generation() == Some(generation) {
            std::mem::take(&mut *state)
        } else {
            SessionState::Idle
        }
    }
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        let state = std::mem::take(&mut *self.lock_state());
        release_session(state);
    }
}

/// Clears the start-in-flight flag when `start_preview` returns
struct StartGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> StartGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self, CameraError> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| Self { flag })
            .map_err(|_| CameraError::SessionBusy)
    }
}

impl Drop for StartGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Handle to the camera session bridge. Clones share the same session.
#[derive(Clone)]
pub struct CameraBridge {
    inner: Arc<BridgeInner>,
}

impl CameraBridge {
    pub fn new(backend: PlatformBackend, config: BridgeConfig) -> Self {
        let (events, _) = broadcast::channel(config.events.capacity.max(1));
        log::info!(
            "Camera bridge created (open timeout {} ms, selection {:?})",
            config.preview.open_timeout_ms,
            config.preview.camera_selection
        );
        Self {
            inner: Arc::new(BridgeInner {
                backend,
                config: RwLock::new(config),
                state: Mutex::new(SessionState::Idle),
                starting: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                close_requests: AtomicU64::new(0),
                live_contexts: Arc::new(AtomicUsize::new(0)),
                controls: Mutex::new(ControlValues::default()),
                events,
            }),
        }
    }

    /// Bridge over the desktop backend, plus the registry its frames land in
    pub fn native(config: BridgeConfig) -> (Self, PixelBufferRegistry) {
        let (backend, registry) = PlatformBackend::native();
        (Self::new(backend, config), registry)
    }

    /// Describe every attached USB peripheral.
    ///
    /// Never fails: a failing USB query is logged and yields an empty list.
    pub fn enumerate_devices(&self) -> Vec<String> {
        match self.inner.backend.cameras.camera_id_list() {
            Ok(ids) => {
                for id in &ids {
                    log::debug!("System camera id: {}", id);
                }
            }
            Err(e) => log::debug!("Camera id query failed during enumeration: {}", e),
        }

        match self.inner.backend.usb.device_list() {
            Ok(devices) => {
                log::info!("Found {} USB devices", devices.len());
                devices.iter().map(|device| device.descriptor()).collect()
            }
            Err(e) => {
                log::warn!("USB device enumeration failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Open a camera and stream it into a fresh 640x480 surface.
    ///
    /// Resolves with the surface id once the device is open and the
    /// repeating request is committed. Any previous session is torn down
    /// first. A second call while one is in flight fails with `SessionBusy`.
    pub async fn start_preview(&self, options: PreviewOptions) -> Result<i64, CameraError> {
        let _guard = StartGuard::acquire(&self.inner.starting)?;
        let close_epoch = self.inner.close_requests.load(Ordering::SeqCst);

        self.run_blocking(|bridge| bridge.release_current()).await?;
        assert_invariant!(
            self.phase() == SessionPhase::Idle,
            "Previous session is torn down before a new preview starts",
            "start_preview"
        );

        let config = self.config();
        let selection = config.preview.camera_selection;
        let camera_id = self
            .run_blocking(move |bridge| bridge.select_camera(&options, selection))
            .await??;
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Starting preview session {} on camera {}",
            session_id,
            camera_id
        );

        let worker =
            BackgroundContext::start_counted(BACKGROUND_THREAD_NAME, &self.inner.live_contexts)?;
        let mut surface = match self.inner.backend.textures.create_surface_texture() {
            Ok(surface) => surface,
            Err(e) => {
                log::error!("Failed to allocate preview surface: {}", e);
                if let Err(stop_err) = worker.quit_safely() {
                    log::warn!("Failed to stop background context: {}", stop_err);
                }
                return Err(e);
            }
        };
        surface.set_default_buffer_size(PREVIEW_WIDTH, PREVIEW_HEIGHT);
        let handle = surface.handle();
        assert_invariant!(
            handle.width == PREVIEW_WIDTH && handle.height == PREVIEW_HEIGHT,
            "Preview surface buffer is 640x480",
            "start_preview"
        );
        let surface_id = surface.id();
        let executor = worker.executor();

        let (responder, completion) = oneshot::channel();
        let opening = OpeningSession {
            generation,
            session_id: session_id.clone(),
            camera_id: camera_id.clone(),
            worker,
            surface,
            responder: Some(responder),
        };
        let cancelled = {
            let mut state = self.inner.lock_state();
            if self.inner.close_requests.load(Ordering::SeqCst) != close_epoch {
                Some(opening)
            } else {
                *state = SessionState::Opening(opening);
                None
            }
        };
        if let Some(opening) = cancelled {
            log::warn!(
                "Preview session {} cancelled by close_device during setup",
                session_id
            );
            release_blocking(SessionState::Opening(opening)).await;
            return Err(CameraError::PreviewCancelled);
        }
        log::debug!(
            "Session {} opening: surface {}, generation {}",
            session_id,
            surface_id,
            generation
        );

        let weak = Arc::downgrade(&self.inner);
        let callback = DeviceStateCallback::new(executor, move |event| match weak.upgrade() {
            Some(inner) => handle_device_event(&inner, generation, event),
            None => discard_event(event),
        });

        let open_id = camera_id.clone();
        let opened = self
            .run_blocking(move |bridge| {
                bridge.inner.backend.cameras.open_camera(&open_id, callback)
            })
            .await
            .and_then(|result| result);
        if let Err(e) = opened {
            log::error!("Failed to open camera {}: {}", camera_id, e);
            release_blocking(self.inner.take_generation(generation)).await;
            return Err(e);
        }

        match tokio::time::timeout(config.open_timeout(), completion).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                log::warn!("Preview session {} cancelled before the camera opened", session_id);
                Err(CameraError::PreviewCancelled)
            }
            Err(_) => {
                let timeout_ms = config.preview.open_timeout_ms;
                log::error!(
                    "Camera {} did not open within {} ms",
                    camera_id,
                    timeout_ms
                );
                let stale = self.inner.take_generation(generation);
                let was_current = !matches!(stale, SessionState::Idle);
                release_blocking(stale).await;
                if was_current {
                    self.inner.emit(
                        &session_id,
                        BridgeEventKind::OpenTimeout {
                            camera_id,
                            timeout_ms,
                        },
                    );
                }
                Err(CameraError::OpenTimeout(timeout_ms))
            }
        }
    }

    /// Release the current session, if any. Idempotent and never fails.
    ///
    /// A `start_preview` still setting up when this is called resolves with
    /// `PreviewCancelled`.
    pub fn close_device(&self) {
        self.inner.close_requests.fetch_add(1, Ordering::SeqCst);
        self.release_current();
    }

    fn release_current(&self) {
        let previous = std::mem::take(&mut *self.inner.lock_state());
        let Some(session_id) = previous.session_id().map(str::to_string) else {
            log::debug!("close_device: no active session");
            return;
        };

        log::info!(
            "Closing preview session {} (camera {})",
            session_id,
            previous.camera_id().unwrap_or("?")
        );
        release_session(previous);
        self.inner.emit(&session_id, BridgeEventKind::Closed);
    }

    /// Run a blocking platform call off the async runtime
    async fn run_blocking<T, F>(&self, f: F) -> Result<T, CameraError>
    where
        F: FnOnce(&CameraBridge) -> T + Send + 'static,
        T: Send + 'static,
    {
        let bridge = self.clone();
        tokio::task::spawn_blocking(move || f(&bridge))
            .await
            .map_err(|e| CameraError::InitializationError(format!("Task join error: {}", e)))
    }

    /// Set a normalized control value in `[-1.0, 1.0]`.
    ///
    /// While streaming, the repeating request is recommitted with the new
    /// value; otherwise it is kept for the next preview.
    pub fn set_control(&self, control: CameraControl, value: f64) -> Result<(), CameraError> {
        if !value.is_finite() || !(-1.0..=1.0).contains(&value) {
            return Err(CameraError::InvalidArgument(format!(
                "{} must be within [-1.0, 1.0], got {}",
                control.as_str(),
                value
            )));
        }

        let mut state = self.inner.lock_state();
        let mut controls = self.inner.controls();
        controls.set(control, value);

        if let SessionState::Streaming(streaming) = &mut *state {
            if let (Some(capture), Some(request)) =
                (streaming.capture.as_mut(), streaming.request.as_mut())
            {
                let updated = request.clone().with_controls(controls);
                capture.set_repeating_request(&updated)?;
                *request = updated;
            }
        }

        // Only kept once the running session accepted it
        *self.inner.controls.lock().unwrap_or_else(|e| e.into_inner()) = controls;
        log::debug!("{} set to {}", control.as_str(), value);
        Ok(())
    }

    pub fn controls(&self) -> ControlValues {
        self.inner.controls()
    }

    pub fn phase(&self) -> SessionPhase {
        self.inner.lock_state().phase()
    }

    pub fn current_surface_id(&self) -> Option<i64> {
        self.inner.lock_state().surface_id()
    }

    pub fn current_camera_id(&self) -> Option<String> {
        self.inner.lock_state().camera_id().map(str::to_string)
    }

    /// Background contexts whose thread is still running
    pub fn live_background_contexts(&self) -> usize {
        self.inner.live_contexts.load(Ordering::SeqCst)
    }

    /// Subscribe to session events. Each receiver sees events sent after it
    /// subscribed.
    pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
        self.inner.events.subscribe()
    }

    pub fn config(&self) -> BridgeConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Replace the configuration. Applies from the next `start_preview`;
    /// the event capacity is fixed when the bridge is created.
    pub fn set_config(&self, config: BridgeConfig) -> Result<(), CameraError> {
        config
            .validate()
            .map_err(CameraError::InvalidArgument)?;
        *self.inner.config.write().unwrap_or_else(|e| e.into_inner()) = config;
        log::info!("Bridge configuration updated");
        Ok(())
    }

    fn select_camera(
        &self,
        options: &PreviewOptions,
        selection: CameraSelection,
    ) -> Result<String, CameraError> {
        let ids = self.inner.backend.cameras.camera_id_list()?;
        for id in &ids {
            log::debug!("Camera id available: {}", id);
        }

        if let Some(index) = options.index {
            return ids.get(index).cloned().ok_or_else(|| {
                log::warn!(
                    "Camera index {} requested but only {} cameras present",
                    index,
                    ids.len()
                );
                CameraError::NoCameraAvailable
            });
        }

        if selection == CameraSelection::PreferExternal {
            for id in &ids {
                match self.inner.backend.cameras.lens_facing(id) {
                    Ok(LensFacing::External) => return Ok(id.clone()),
                    Ok(_) => {}
                    Err(e) => log::debug!("Lens facing query failed for camera {}: {}", id, e),
                }
            }
            log::debug!("No external camera found, falling back to the first id");
        }

        ids.into_iter().next().ok_or(CameraError::NoCameraAvailable)
    }
}

/// Teardown joins the session's thread, so it runs on the blocking pool
async fn release_blocking(state: SessionState) {
    if matches!(state, SessionState::Idle) {
        return;
    }
    if let Err(e) = tokio::task::spawn_blocking(move || release_session(state)).await {
        log::warn!("Session teardown task failed: {}", e);
    }
}

/// Runs on the session's background context
fn handle_device_event(inner: &Arc<BridgeInner>, generation: u64, event: DeviceStateEvent) {
    match event {
        DeviceStateEvent::Opened(device) => on_opened(inner, generation, device),
        DeviceStateEvent::Disconnected => on_lost(inner, generation, None),
        DeviceStateEvent::Error(code) => on_lost(inner, generation, Some(code)),
    }
}

fn on_opened(inner: &Arc<BridgeInner>, generation: u64, mut device: Box<dyn CameraDevice>) {
    let mut state = inner.lock_state();
    let opening = match std::mem::take(&mut *state) {
        SessionState::Opening(opening) if opening.generation == generation => opening,
        other => {
            *state = other;
            drop(state);
            log::warn!(
                "Camera {} opened for a session that is gone, closing it",
                device.id()
            );
            if let Err(e) = device.close() {
                log::warn!("Failed to close stale camera {}: {}", device.id(), e);
            }
            return;
        }
    };

    let OpeningSession {
        generation,
        session_id,
        camera_id,
        worker,
        surface,
        responder,
    } = opening;
    log::info!("Camera {} opened, configuring capture session", camera_id);

    let request = CaptureRequest::new(CaptureTemplate::Preview)
        .add_target(surface.handle())
        .with_af_mode(AfMode::ContinuousPicture)
        .with_controls(inner.controls());
    assert_invariant!(
        request.targets.iter().any(|t| t.texture_id == surface.id()),
        "Repeating request targets the preview surface",
        "on_opened"
    );

    let (capture, request, configure_error) = match configure_capture(device.as_mut(), &request) {
        Ok(capture) => (Some(capture), Some(request), None),
        Err(e) => {
            log::error!("Capture session configuration failed for camera {}: {}", camera_id, e);
            (None, None, Some(e))
        }
    };

    let surface_id = surface.id();
    *state = SessionState::Streaming(StreamingSession {
        generation,
        session_id: session_id.clone(),
        camera_id: camera_id.clone(),
        worker,
        surface,
        device,
        capture,
        request,
    });
    drop(state);

    match configure_error {
        None => {
            log::info!("Preview streaming: camera {} -> surface {}", camera_id, surface_id);
            inner.emit(
                &session_id,
                BridgeEventKind::Streaming {
                    surface_id,
                    camera_id,
                },
            );
        }
        Some(e) => inner.emit(
            &session_id,
            BridgeEventKind::ConfigureFailed {
                camera_id,
                reason: e.to_string(),
            },
        ),
    }

    if let Some(responder) = responder {
        if responder.send(Ok(surface_id)).is_err() {
            log::debug!("Preview caller went away before the camera opened");
        }
    }
}

fn configure_capture(
    device: &mut dyn CameraDevice,
    request: &CaptureRequest,
) -> Result<Box<dyn CaptureSession>, CameraError> {
    let mut capture = device.create_capture_session(&request.targets)?;
    if let Err(e) = capture.set_repeating_request(request) {
        if let Err(close_err) = capture.close() {
            log::warn!("Failed to close rejected capture session: {}", close_err);
        }
        return Err(e);
    }
    Ok(capture)
}

/// Disconnected (`code == None`) or device error
fn on_lost(inner: &Arc<BridgeInner>, generation: u64, code: Option<i32>) {
    let mut lost = inner.take_generation(generation);
    let (Some(session_id), Some(camera_id)) = (
        lost.session_id().map(str::to_string),
        lost.camera_id().map(str::to_string),
    ) else {
        log::debug!("Ignoring device state change for a session that is gone");
        return;
    };

    let (error, kind) = match code {
        None => {
            log::warn!("Camera {} disconnected", camera_id);
            (
                CameraError::Disconnected,
                BridgeEventKind::Disconnected {
                    camera_id: camera_id.clone(),
                },
            )
        }
        Some(code) => {
            log::error!("Camera {} reported device error {}", camera_id, code);
            (
                CameraError::DeviceError(code),
                BridgeEventKind::DeviceError {
                    camera_id: camera_id.clone(),
                    code,
                },
            )
        }
    };

    if let SessionState::Opening(opening) = &mut lost {
        if let Some(responder) = opening.responder.take() {
            let _ = responder.send(Err(error));
        }
    }

    release_session(lost);
    inner.emit(&session_id, kind);
}

/// The bridge is gone; only make sure a delivered device is not leaked
fn discard_event(event: DeviceStateEvent) {
    if let DeviceStateEvent::Opened(mut device) = event {
        log::debug!("Closing camera {} opened after the bridge was dropped", device.id());
        if let Err(e) = device.close() {
            log::warn!("Failed to close orphaned camera: {}", e);
        }
    }
}
