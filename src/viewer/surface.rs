//! Presentation seam between the viewer session and whatever draws it.
//!
//! A [`RenderSurface`] owns the render target: it reports its size,
//! notifies size changes through a channel and receives one
//! [`FrameView`] per frame. [`HeadlessSurface`] draws nothing and records
//! what it was asked to present.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::errors::{Error, Result};
use crate::scene::{Light, PerspectiveCamera, Scene, Transform};

/// Logical size of a surface plus the display's pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurfaceSize {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl SurfaceSize {
    #[must_use]
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            pixel_ratio: 1.0,
        }
    }

    #[must_use]
    pub fn with_pixel_ratio(mut self, ratio: f32) -> Self {
        self.pixel_ratio = ratio;
        self
    }

    /// `None` for a zero-height surface.
    #[must_use]
    pub fn aspect(&self) -> Option<f32> {
        (self.width > 0 && self.height > 0).then(|| self.width as f32 / self.height as f32)
    }

    /// Render-target size in physical pixels with the pixel ratio capped.
    #[must_use]
    pub fn physical(&self, pixel_ratio_cap: f32) -> (u32, u32) {
        let ratio = self.pixel_ratio.clamp(0.0, pixel_ratio_cap.max(0.0));
        (
            (self.width as f32 * ratio).round() as u32,
            (self.height as f32 * ratio).round() as u32,
        )
    }
}

impl Default for SurfaceSize {
    fn default() -> Self {
        Self::new(1280, 720)
    }
}

/// Everything a surface needs to draw one frame.
pub struct FrameView<'a> {
    pub scene: &'a Scene,
    pub camera: &'a PerspectiveCamera,
    pub camera_transform: &'a Transform,
    pub lights: &'a [Light],
    pub background: Option<[f32; 4]>,
}

/// Render target driven by a [`ViewerSession`](super::ViewerSession).
pub trait RenderSurface {
    fn size(&self) -> SurfaceSize;

    /// Resizes the render target. `physical` is in device pixels.
    fn configure(&mut self, size: SurfaceSize, physical: (u32, u32));

    /// Starts observing size changes. Dropping the receiver stops them.
    fn observe_resize(&mut self) -> flume::Receiver<SurfaceSize>;

    fn present(&mut self, frame: &FrameView<'_>) -> Result<()>;

    /// Releases the render target and its environment resources.
    fn dispose(&mut self);
}

// ============================================================================
// Headless
// ============================================================================

#[derive(Debug, Default)]
struct HeadlessState {
    size: SurfaceSize,
    physical: (u32, u32),
    frames: u64,
    last_mesh_count: usize,
    last_light_count: usize,
    disposed: bool,
    fail_next: Option<String>,
    resize_tx: Option<flume::Sender<SurfaceSize>>,
}

/// Surface with no GPU behind it.
pub struct HeadlessSurface {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessSurface {
    /// Returns the surface and a handle for observing and driving it.
    #[must_use]
    pub fn new(size: SurfaceSize) -> (Self, HeadlessHandle) {
        let state = Arc::new(Mutex::new(HeadlessState {
            size,
            ..HeadlessState::default()
        }));
        (
            Self {
                state: Arc::clone(&state),
            },
            HeadlessHandle { state },
        )
    }
}

impl RenderSurface for HeadlessSurface {
    fn size(&self) -> SurfaceSize {
        self.state.lock().size
    }

    fn configure(&mut self, size: SurfaceSize, physical: (u32, u32)) {
        let mut state = self.state.lock();
        state.size = size;
        state.physical = physical;
    }

    fn observe_resize(&mut self) -> flume::Receiver<SurfaceSize> {
        let (tx, rx) = flume::unbounded();
        self.state.lock().resize_tx = Some(tx);
        rx
    }

    fn present(&mut self, frame: &FrameView<'_>) -> Result<()> {
        let mut state = self.state.lock();
        if state.disposed {
            return Err(Error::Surface("surface has been disposed".to_string()));
        }
        if let Some(message) = state.fail_next.take() {
            return Err(Error::Surface(message));
        }
        state.frames += 1;
        state.last_mesh_count = frame.scene.mesh_count();
        state.last_light_count = frame.lights.len();
        Ok(())
    }

    fn dispose(&mut self) {
        let mut state = self.state.lock();
        state.disposed = true;
        state.resize_tx = None;
    }
}

/// Shared view of a [`HeadlessSurface`]: statistics plus a way to
/// simulate host resizes.
#[derive(Clone)]
pub struct HeadlessHandle {
    state: Arc<Mutex<HeadlessState>>,
}

impl HeadlessHandle {
    /// Simulates the host resizing the surface. Returns `false` when
    /// nobody is observing.
    pub fn resize(&self, size: SurfaceSize) -> bool {
        let state = self.state.lock();
        state
            .resize_tx
            .as_ref()
            .is_some_and(|tx| tx.send(size).is_ok())
    }

    /// Makes the next `present` fail with `message`.
    pub fn fail_next_present(&self, message: impl Into<String>) {
        self.state.lock().fail_next = Some(message.into());
    }

    #[must_use]
    pub fn frames_presented(&self) -> u64 {
        self.state.lock().frames
    }

    #[must_use]
    pub fn last_mesh_count(&self) -> usize {
        self.state.lock().last_mesh_count
    }

    #[must_use]
    pub fn last_light_count(&self) -> usize {
        self.state.lock().last_light_count
    }

    #[must_use]
    pub fn configured_size(&self) -> SurfaceSize {
        self.state.lock().size
    }

    #[must_use]
    pub fn physical_size(&self) -> (u32, u32) {
        self.state.lock().physical
    }

    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    /// Whether a resize receiver is still alive.
    #[must_use]
    pub fn is_observed(&self) -> bool {
        self.state
            .lock()
            .resize_tx
            .as_ref()
            .is_some_and(|tx| !tx.is_disconnected())
    }
}
