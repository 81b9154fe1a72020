//! Viewer
//!
//! - [`ViewerSession`]: camera, controls, lights and the displayed asset
//! - [`RenderSurface`]: what the session presents frames to
//! - [`HeadlessSurface`]: a surface that only records what it was given

pub mod session;
pub mod surface;

pub use session::{AssetSummary, FRAME_STEPS, FrameStep, LoadOutcome, PendingLoad, SessionState, ViewerSession};
pub use surface::{FrameView, HeadlessHandle, HeadlessSurface, RenderSurface, SurfaceSize};
