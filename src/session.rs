//! Per-session background execution context and the session state value.

use crate::errors::CameraError;
use crate::platform::{CameraDevice, CaptureSession, SurfaceTexture};
use crate::types::{CaptureRequest, SessionPhase};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Responder for the pending `start_preview` call
pub(crate) type Responder = oneshot::Sender<Result<i64, CameraError>>;

/// Posts work onto a background context.
///
/// Holds only a weak sender: outstanding handles never keep a stopped
/// context's queue open.
#[derive(Clone)]
pub struct ExecutorHandle {
    sender: mpsc::WeakUnboundedSender<Job>,
}

impl ExecutorHandle {
    /// Queue a job. Returns the job back if the context has already stopped.
    pub fn post(&self, job: Job) -> Result<(), Job> {
        match self.sender.upgrade() {
            Some(sender) => sender.send(job).map_err(|e| e.0),
            None => Err(job),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .upgrade()
            .map(|sender| sender.is_closed())
            .unwrap_or(true)
    }
}

/// Decrements a live-context counter when the worker thread ends
struct LiveContext(Arc<AtomicUsize>);

impl Drop for LiveContext {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A dedicated single-thread work queue
pub struct BackgroundContext {
    name: String,
    sender: Option<mpsc::UnboundedSender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl BackgroundContext {
    pub fn start(name: &str) -> Result<Self, CameraError> {
        Self::start_counted(name, &Arc::new(AtomicUsize::new(0)))
    }

    /// Like `start`, counting the thread in `live` until it exits
    pub fn start_counted(name: &str, live: &Arc<AtomicUsize>) -> Result<Self, CameraError> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        live.fetch_add(1, Ordering::SeqCst);
        let alive = LiveContext(live.clone());

        let thread = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let _alive = alive;
                while let Some(job) = rx.blocking_recv() {
                    job();
                }
            })
            .map_err(|e| {
                CameraError::InitializationError(format!(
                    "Failed to start background thread: {}",
                    e
                ))
            })?;

        log::debug!("Background context '{}' started", name);
        Ok(Self {
            name: name.to_string(),
            sender: Some(tx),
            thread: Some(thread),
        })
    }

    pub fn executor(&self) -> Option<ExecutorHandle> {
        self.sender.as_ref().map(|sender| ExecutorHandle {
            sender: sender.downgrade(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop accepting work, let queued jobs drain, then join the thread.
    ///
    /// Called from the context's own thread the join is skipped and the
    /// thread exits once its current job returns.
    pub fn quit_safely(mut self) -> Result<(), CameraError> {
        self.sender = None;

        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        if thread.thread().id() == std::thread::current().id() {
            log::debug!(
                "Background context '{}' stopping from its own thread, detaching",
                self.name
            );
            return Ok(());
        }

        thread.join().map_err(|_| {
            CameraError::InitializationError(format!(
                "Background context '{}' panicked",
                self.name
            ))
        })?;
        log::debug!("Background context '{}' stopped", self.name);
        Ok(())
    }
}

impl Drop for BackgroundContext {
    fn drop(&mut self) {
        // Closing the queue is enough to end the thread; it is not joined here.
        self.sender = None;
    }
}

/// Resources of a session waiting for its open callback
pub(crate) struct OpeningSession {
    pub generation: u64,
    pub session_id: String,
    pub camera_id: String,
    pub worker: BackgroundContext,
    pub surface: Box<dyn SurfaceTexture>,
    pub responder: Option<Responder>,
}

/// Resources of an opened, configured session
pub(crate) struct StreamingSession {
    pub generation: u64,
    pub session_id: String,
    pub camera_id: String,
    pub worker: BackgroundContext,
    pub surface: Box<dyn SurfaceTexture>,
    pub device: Box<dyn CameraDevice>,
    /// `None` when configuration failed
    pub capture: Option<Box<dyn CaptureSession>>,
    pub request: Option<CaptureRequest>,
}

/// The single session slot owned by the bridge
#[derive(Default)]
pub(crate) enum SessionState {
    #[default]
    Idle,
    Opening(OpeningSession),
    Streaming(StreamingSession),
}

impl SessionState {
    pub fn phase(&self) -> SessionPhase {
        match self {
            SessionState::Idle => SessionPhase::Idle,
            SessionState::Opening(_) => SessionPhase::Opening,
            SessionState::Streaming(s) if s.capture.is_none() => SessionPhase::Failed,
            SessionState::Streaming(_) => SessionPhase::Streaming,
        }
    }

    pub fn generation(&self) -> Option<u64> {
        match self {
            SessionState::Idle => None,
            SessionState::Opening(s) => Some(s.generation),
            SessionState::Streaming(s) => Some(s.generation),
        }
    }

    pub fn surface_id(&self) -> Option<i64> {
        match self {
            SessionState::Idle => None,
            SessionState::Opening(s) => Some(s.surface.id()),
            SessionState::Streaming(s) => Some(s.surface.id()),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            SessionState::Idle => None,
            SessionState::Opening(s) => Some(&s.session_id),
            SessionState::Streaming(s) => Some(&s.session_id),
        }
    }

    pub fn camera_id(&self) -> Option<&str> {
        match self {
            SessionState::Idle => None,
            SessionState::Opening(s) => Some(&s.camera_id),
            SessionState::Streaming(s) => Some(&s.camera_id),
        }
    }
}

/// Release everything a session owns, in order: capture session, device,
/// surface, background context. Failures are logged and discarded.
pub(crate) fn release_session(state: SessionState) {
    match state {
        SessionState::Idle => {}
        SessionState::Opening(opening) => {
            log::debug!(
                "Releasing opening session {} (camera {})",
                opening.session_id,
                opening.camera_id
            );
            // Dropping the responder resolves the pending call as cancelled.
            drop(opening.responder);
            release_surface(opening.surface);
            stop_worker(opening.worker);
        }
        SessionState::Streaming(streaming) => {
            log::debug!(
                "Releasing streaming session {} (camera {})",
                streaming.session_id,
                streaming.camera_id
            );
            if let Some(mut capture) = streaming.capture {
                if let Err(e) = capture.close() {
                    log::warn!("Failed to close capture session: {}", e);
                }
            }
            let mut device = streaming.device;
            if let Err(e) = device.close() {
                log::warn!("Failed to close camera device: {}", e);
            }
            release_surface(streaming.surface);
            stop_worker(streaming.worker);
        }
    }
}

fn release_surface(mut surface: Box<dyn SurfaceTexture>) {
    let id = surface.id();
    if let Err(e) = surface.release() {
        log::warn!("Failed to release surface {}: {}", id, e);
    }
}

fn stop_worker(worker: BackgroundContext) {
    let name = worker.name().to_string();
    if let Err(e) = worker.quit_safely() {
        log::warn!("Failed to stop background context '{}': {}", name, e);
    }
}
