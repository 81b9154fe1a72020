//! Configuration
//!
//! Every option has a default, so an empty JSON object (or no file at all)
//! yields a working setup.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use curio::config::CurioConfig;
//!
//! let config = CurioConfig::from_json_str(r#"{
//!     "loader": { "draco_decoder_path": "/static/draco/" },
//!     "viewer": { "show_grid": true, "background": [0.1, 0.1, 0.12, 1.0] }
//! }"#)?;
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::errors::{Error, Result};

/// Root configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CurioConfig {
    pub loader: LoaderConfig,
    pub viewer: ViewerOptions,
}

impl CurioConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&text)
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Options consumed by the format dispatcher and its transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Base directory for relative file locators.
    pub asset_root: PathBuf,
    /// Location of the external Draco decoder's assets.
    pub draco_decoder_path: String,
    /// Timeout applied to HTTP fetches.
    pub http_timeout_secs: u64,
    /// Bytes read per progress step when streaming local files.
    pub read_chunk_size: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            asset_root: PathBuf::from("."),
            draco_decoder_path: "draco/".to_string(),
            http_timeout_secs: 30,
            read_chunk_size: 64 * 1024,
        }
    }
}

// ============================================================================
// Viewer
// ============================================================================

/// What happens to the displayed asset when a new load starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplacePolicy {
    /// Dispose the current asset before the new one is fetched.
    /// A failed load leaves the viewer empty.
    #[default]
    DisposeBeforeDispatch,
    /// Keep the current asset on screen until the new one decoded.
    /// A failed load keeps the old asset.
    KeepUntilReady,
}

/// Viewer session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerOptions {
    pub show_grid: bool,
    pub show_axes: bool,
    /// Clear color (RGBA, linear). `None` keeps the surface default.
    pub background: Option<[f32; 4]>,

    pub fov_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub initial_camera_position: [f32; 3],

    pub enable_damping: bool,
    /// Multiplier applied to the fitted camera distance.
    pub fit_padding: f32,
    /// Upper bound for the device pixel ratio reported by the surface.
    pub pixel_ratio_cap: f32,

    pub replace_policy: ReplacePolicy,
}

impl Default for ViewerOptions {
    fn default() -> Self {
        Self {
            show_grid: false,
            show_axes: false,
            background: None,
            fov_degrees: 60.0,
            near: 0.01,
            far: 1000.0,
            initial_camera_position: [2.5, 1.5, 2.5],
            enable_damping: true,
            fit_padding: 1.5,
            pixel_ratio_cap: 2.0,
            replace_policy: ReplacePolicy::default(),
        }
    }
}

impl ViewerOptions {
    #[must_use]
    pub fn with_grid(mut self, show: bool) -> Self {
        self.show_grid = show;
        self
    }

    #[must_use]
    pub fn with_axes(mut self, show: bool) -> Self {
        self.show_axes = show;
        self
    }

    #[must_use]
    pub fn with_background(mut self, rgba: [f32; 4]) -> Self {
        self.background = Some(rgba);
        self
    }

    #[must_use]
    pub fn with_replace_policy(mut self, policy: ReplacePolicy) -> Self {
        self.replace_policy = policy;
        self
    }
}
