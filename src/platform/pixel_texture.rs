//! Software pixel-buffer textures
//!
//! Each texture keeps the most recent RGBA frame a capture session wrote into
//! it. The UI layer pulls frames with `copy_pixel_buffer`; listeners can be
//! told when a new frame is available.

use crate::errors::CameraError;
use crate::platform::{SurfaceTexture, TextureRegistry};
use crate::types::{PixelBuffer, SurfaceHandle, PREVIEW_HEIGHT, PREVIEW_WIDTH};
use image::{imageops::FilterType, RgbImage, RgbaImage};
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

type FrameListener = Arc<dyn Fn(i64) + Send + Sync>;

struct BufferState {
    width: u32,
    height: u32,
    frame: Option<RgbaImage>,
    frame_count: u64,
}

/// Shared frame slot behind a texture id
pub struct PixelBufferTarget {
    texture_id: i64,
    state: Mutex<BufferState>,
    listener: Option<FrameListener>,
}

impl PixelBufferTarget {
    pub fn texture_id(&self) -> i64 {
        self.texture_id
    }

    pub fn size(&self) -> (u32, u32) {
        self.state
            .lock()
            .map(|s| (s.width, s.height))
            .unwrap_or((PREVIEW_WIDTH, PREVIEW_HEIGHT))
    }

    /// Scale an RGB frame to the buffer size and store it as RGBA
    pub fn write_rgb(&self, frame: RgbImage) -> Result<(), CameraError> {
        let (width, height) = self.size();
        let frame = if frame.width() != width || frame.height() != height {
            image::imageops::resize(&frame, width, height, FilterType::Triangle)
        } else {
            frame
        };
        let rgba = image::DynamicImage::ImageRgb8(frame).to_rgba8();

        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| CameraError::SurfaceError("Pixel buffer lock poisoned".to_string()))?;
            state.frame = Some(rgba);
            state.frame_count += 1;
        }

        if let Some(listener) = &self.listener {
            listener(self.texture_id);
        }
        Ok(())
    }

    pub fn copy_pixel_buffer(&self) -> Option<PixelBuffer> {
        let state = self.state.lock().ok()?;
        let frame = state.frame.as_ref()?;
        Some(PixelBuffer {
            texture_id: self.texture_id,
            width: frame.width(),
            height: frame.height(),
            data: frame.as_raw().clone(),
            frame_count: state.frame_count,
        })
    }

    pub fn frame_count(&self) -> u64 {
        self.state.lock().map(|s| s.frame_count).unwrap_or(0)
    }
}

struct RegistryInner {
    next_id: AtomicI64,
    textures: RwLock<HashMap<i64, Arc<PixelBufferTarget>>>,
    listener: RwLock<Option<FrameListener>>,
}

/// Registry of live pixel-buffer textures. Clones share the same registry.
#[derive(Clone)]
pub struct PixelBufferRegistry {
    inner: Arc<RegistryInner>,
}

impl PixelBufferRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicI64::new(1),
                textures: RwLock::new(HashMap::new()),
                listener: RwLock::new(None),
            }),
        }
    }

    /// Called with the texture id whenever a texture receives a frame.
    /// Applies to textures created afterwards.
    pub fn set_frame_listener<F>(&self, listener: F)
    where
        F: Fn(i64) + Send + Sync + 'static,
    {
        if let Ok(mut slot) = self.inner.listener.write() {
            *slot = Some(Arc::new(listener));
        }
    }

    pub fn lookup(&self, texture_id: i64) -> Option<Arc<PixelBufferTarget>> {
        self.inner.textures.read().ok()?.get(&texture_id).cloned()
    }

    pub fn copy_pixel_buffer(&self, texture_id: i64) -> Option<PixelBuffer> {
        self.lookup(texture_id)?.copy_pixel_buffer()
    }

    pub fn len(&self) -> usize {
        self.inner.textures.read().map(|t| t.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn unregister(&self, texture_id: i64) -> bool {
        self.inner
            .textures
            .write()
            .map(|mut t| t.remove(&texture_id).is_some())
            .unwrap_or(false)
    }
}

impl Default for PixelBufferRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureRegistry for PixelBufferRegistry {
    fn create_surface_texture(&self) -> Result<Box<dyn SurfaceTexture>, CameraError> {
        let texture_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let listener = self.inner.listener.read().ok().and_then(|l| l.clone());

        let target = Arc::new(PixelBufferTarget {
            texture_id,
            state: Mutex::new(BufferState {
                width: PREVIEW_WIDTH,
                height: PREVIEW_HEIGHT,
                frame: None,
                frame_count: 0,
            }),
            listener,
        });

        self.inner
            .textures
            .write()
            .map_err(|_| CameraError::SurfaceError("Texture registry lock poisoned".to_string()))?
            .insert(texture_id, target.clone());

        log::debug!("Registered pixel buffer texture {}", texture_id);
        Ok(Box::new(PixelBufferTexture {
            registry: self.clone(),
            target,
            released: false,
        }))
    }
}

/// Owning handle to a registered pixel-buffer texture
pub struct PixelBufferTexture {
    registry: PixelBufferRegistry,
    target: Arc<PixelBufferTarget>,
    released: bool,
}

impl SurfaceTexture for PixelBufferTexture {
    fn id(&self) -> i64 {
        self.target.texture_id
    }

    fn set_default_buffer_size(&mut self, width: u32, height: u32) {
        if let Ok(mut state) = self.target.state.lock() {
            state.width = width;
            state.height = height;
            state.frame = None;
        }
    }

    fn handle(&self) -> SurfaceHandle {
        let (width, height) = self.target.size();
        SurfaceHandle {
            texture_id: self.target.texture_id,
            width,
            height,
        }
    }

    fn release(&mut self) -> Result<(), CameraError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.registry.unregister(self.target.texture_id) {
            log::debug!("Unregistered pixel buffer texture {}", self.target.texture_id);
            Ok(())
        } else {
            Err(CameraError::SurfaceError(format!(
                "Texture {} was not registered",
                self.target.texture_id
            )))
        }
    }
}

impl Drop for PixelBufferTexture {
    fn drop(&mut self) {
        if !self.released {
            self.registry.unregister(self.target.texture_id);
        }
    }
}
