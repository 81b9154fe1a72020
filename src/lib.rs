#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod animation;
pub mod assets;
pub mod config;
pub mod errors;
pub mod lifecycle;
pub mod normalize;
pub mod resources;
pub mod scene;
pub mod utils;
pub mod viewer;

pub use animation::{AnimationAction, AnimationClip, AnimationMixer, Binder, LoopMode};
pub use assets::{FormatDispatcher, LoadRequest, LoadResult, Locator, MemoryStore, ModelFormat, Prefab, Transport};
pub use config::{CurioConfig, LoaderConfig, ReplacePolicy, ViewerOptions};
pub use errors::{DecodeError, Error, Result, TransportError};
pub use lifecycle::{DisposeReport, dispose};
pub use normalize::{Normalization, normalize};
pub use resources::{BoundingBox, Geometry, Material, Mesh, Side, Texture};
pub use scene::{Light, Node, NodeHandle, PerspectiveCamera, Scene, Transform};
pub use utils::OrbitControls;
pub use viewer::{AssetSummary, HeadlessHandle, HeadlessSurface, RenderSurface, SessionState, SurfaceSize, ViewerSession};
