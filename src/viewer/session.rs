//! Viewer Session
//!
//! [`ViewerSession`] owns everything needed to show one exhibit at a time:
//! the scene, camera, orbit controls, default lights, optional helpers and
//! the render surface. It drives the shared [`FormatDispatcher`] and keeps
//! at most one displayed asset.
//!
//! # Lifecycle
//!
//! ```text
//! open ──► Empty ──prepare_load──► Loading ──complete_load──► Ready
//!                                     ▲                         │
//!                                     └──────prepare_load───────┘
//! close (from any state) ──► Disposed
//! ```
//!
//! A load is split in three so the host can keep rendering while bytes
//! are fetched and decoded:
//!
//! 1. [`ViewerSession::prepare_load`] applies the [`ReplacePolicy`] and
//!    returns a [`PendingLoad`] that borrows nothing from the session.
//! 2. [`PendingLoad::resolve`] fetches, decodes and normalises.
//! 3. [`ViewerSession::complete_load`] installs the result.
//!
//! [`ViewerSession::load_asset`] runs all three back to back.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use curio::{FormatDispatcher, HeadlessSurface, LoadRequest, LoaderConfig, SurfaceSize, ViewerOptions, ViewerSession};
//!
//! let dispatcher = Arc::new(FormatDispatcher::new(LoaderConfig::default()));
//! let (surface, _handle) = HeadlessSurface::new(SurfaceSize::new(800, 600));
//! let mut session = ViewerSession::open(surface, ViewerOptions::default(), dispatcher)?;
//!
//! let summary = session.load_asset(LoadRequest::parse("models/vase.glb")?).await?;
//! println!("{} meshes", summary.mesh_count);
//!
//! loop {
//!     session.frame()?;
//! }
//! ```

use std::sync::Arc;

use glam::{Vec3, Vec4};

use crate::animation::{AnimationMixer, LoopMode};
use crate::assets::{FormatDispatcher, LoadRequest, LoadResult, ModelFormat};
use crate::config::{ReplacePolicy, ViewerOptions};
use crate::errors::{Error, Result};
use crate::lifecycle::{self, DisposeReport};
use crate::resources::primitives::{GridOptions, create_axes, create_grid};
use crate::resources::{BoundingBox, Geometry, Material, Mesh};
use crate::scene::{Light, NodeHandle, PerspectiveCamera, Scene, Transform};
use crate::utils::{OrbitControls, Timer};
use crate::viewer::surface::{FrameView, RenderSurface, SurfaceSize};

const AXES_SIZE: f32 = 1.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Open, nothing displayed.
    Empty,
    /// A load was prepared and has not completed yet.
    Loading,
    /// An asset is displayed.
    Ready,
    /// Closed; every further call fails with [`Error::SessionClosed`].
    Disposed,
}

/// One step of the per-frame update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStep {
    UpdateControls,
    AdvanceAnimation,
    Render,
}

/// Steps run by [`ViewerSession::advance`], in order.
pub const FRAME_STEPS: [FrameStep; 3] = [
    FrameStep::UpdateControls,
    FrameStep::AdvanceAnimation,
    FrameStep::Render,
];

/// Description of the displayed asset returned by a completed load.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetSummary {
    pub root: NodeHandle,
    pub format: ModelFormat,
    /// World-space bounds after normalisation.
    pub bounding_box: BoundingBox,
    pub size: Vec3,
    /// Extent before normalisation.
    pub original_size: Vec3,
    /// Direct children of the root.
    pub node_count: usize,
    pub mesh_count: usize,
    pub has_animation: bool,
    /// Clip names in file order.
    pub animations: Vec<String>,
    /// Clip started on load, if any.
    pub active_animation: Option<String>,
}

/// Result of [`PendingLoad::resolve`], consumed by
/// [`ViewerSession::complete_load`].
pub type LoadOutcome = Result<LoadResult>;

/// A dispatched load that no longer borrows the session.
pub struct PendingLoad {
    dispatcher: Arc<FormatDispatcher>,
    request: LoadRequest,
}

impl PendingLoad {
    /// Fetches, decodes and normalises the requested model.
    pub async fn resolve(self) -> LoadOutcome {
        self.dispatcher.load(self.request).await
    }
}

struct Displayed {
    root: NodeHandle,
    summary: AssetSummary,
    mixer: AnimationMixer,
}

/// Interactive single-exhibit viewer bound to one render surface.
///
/// # Components
///
/// - `scene`: the displayed asset plus grid and axes helpers
/// - `camera` / `camera_transform`: projection and pose, driven by `controls`
/// - `lights`: ambient fill and a directional key light
/// - `surface`: where frames are presented
pub struct ViewerSession<S: RenderSurface> {
    surface: S,
    options: ViewerOptions,
    dispatcher: Arc<FormatDispatcher>,

    scene: Scene,
    camera: PerspectiveCamera,
    camera_transform: Transform,
    controls: OrbitControls,
    lights: Vec<Light>,
    helpers: Vec<NodeHandle>,

    resize_rx: Option<flume::Receiver<SurfaceSize>>,
    timer: Timer,
    running: bool,

    state: SessionState,
    current: Option<Displayed>,
}

impl<S: RenderSurface> ViewerSession<S> {
    /// Sets up camera, controls, lights and helpers on `surface` and starts
    /// observing its size. The session starts [`SessionState::Empty`].
    pub fn open(
        mut surface: S,
        options: ViewerOptions,
        dispatcher: Arc<FormatDispatcher>,
    ) -> Result<Self> {
        let size = surface.size();
        surface.configure(size, size.physical(options.pixel_ratio_cap));

        let camera = PerspectiveCamera::new(
            options.fov_degrees,
            size.aspect().unwrap_or(1.0),
            options.near,
            options.far,
        );

        let eye = Vec3::from_array(options.initial_camera_position);
        let mut camera_transform = Transform::new();
        camera_transform.position = eye;
        camera_transform.look_at(Vec3::ZERO, Vec3::Y);

        let mut controls = OrbitControls::from_position(eye, Vec3::ZERO);
        controls.enable_damping = options.enable_damping;

        let mut scene = Scene::new();
        let mut helpers = Vec::new();
        if options.show_grid {
            helpers.push(add_helper(&mut scene, create_grid(&GridOptions::default())));
        }
        if options.show_axes {
            helpers.push(add_helper(&mut scene, create_axes(AXES_SIZE)));
        }

        let resize_rx = surface.observe_resize();
        log::info!(
            "Viewer session opened at {}x{} (pixel ratio {})",
            size.width,
            size.height,
            size.pixel_ratio
        );

        let mut session = Self {
            surface,
            options,
            dispatcher,
            scene,
            camera,
            camera_transform,
            controls,
            lights: Light::default_rig(),
            helpers,
            resize_rx: Some(resize_rx),
            timer: Timer::new(),
            running: true,
            state: SessionState::Empty,
            current: None,
        };
        session.sync_camera();
        Ok(session)
    }

    // ========================================================================
    // Loading
    // ========================================================================

    /// Loads `request` and displays it, replacing the current asset.
    pub async fn load_asset(&mut self, request: LoadRequest) -> Result<AssetSummary> {
        let pending = self.prepare_load(request)?;
        let outcome = pending.resolve().await;
        self.complete_load(outcome)
    }

    /// Starts a load. Under [`ReplacePolicy::DisposeBeforeDispatch`] the
    /// current asset is disposed before this returns.
    pub fn prepare_load(&mut self, request: LoadRequest) -> Result<PendingLoad> {
        self.ensure_open()?;

        if self.options.replace_policy == ReplacePolicy::DisposeBeforeDispatch {
            self.dispose_current();
        }
        self.state = SessionState::Loading;
        log::debug!("Dispatching load of `{}`", request.locator);

        Ok(PendingLoad {
            dispatcher: Arc::clone(&self.dispatcher),
            request,
        })
    }

    /// Installs a resolved load.
    ///
    /// On failure nothing is inserted and the error is returned; the state
    /// falls back to `Ready` if an asset is still displayed, else `Empty`.
    /// On success the current asset (if any) is disposed first, then the
    /// new one is added, the camera is fitted to it and its first clip
    /// starts looping.
    pub fn complete_load(&mut self, outcome: LoadOutcome) -> Result<AssetSummary> {
        self.ensure_open()?;

        let result = match outcome {
            Ok(result) => result,
            Err(e) => {
                self.state = if self.current.is_some() {
                    SessionState::Ready
                } else {
                    SessionState::Empty
                };
                return Err(e);
            }
        };

        self.dispose_current();

        let LoadResult {
            format,
            prefab,
            animations,
            normalization,
        } = result;

        let root = self.scene.instantiate(prefab);
        self.scene.update_matrix_world();

        let bounding_box = self
            .scene
            .world_bounding_box(root)
            .unwrap_or(normalization.bounding_box);
        self.fit_camera(&bounding_box);

        let mut mixer = AnimationMixer::from_clips(&self.scene, root, &animations);
        let active_animation = if mixer.play(0, LoopMode::Loop, None) {
            animations.first().map(|clip| clip.name.clone())
        } else {
            None
        };

        let summary = AssetSummary {
            root,
            format,
            bounding_box,
            size: bounding_box.size(),
            original_size: normalization.original_size,
            node_count: self.scene.get_node(root).map_or(0, |n| n.children.len()),
            mesh_count: self
                .scene
                .subtree(root)
                .into_iter()
                .filter(|&h| self.scene.get_node(h).is_some_and(|n| n.mesh.is_some()))
                .count(),
            has_animation: !animations.is_empty(),
            animations: animations.iter().map(|clip| clip.name.clone()).collect(),
            active_animation,
        };

        if let Some(name) = &summary.active_animation {
            log::info!("Playing animation `{name}`");
        }

        self.current = Some(Displayed {
            root,
            summary: summary.clone(),
            mixer,
        });
        self.state = SessionState::Ready;
        self.timer.reset();
        Ok(summary)
    }

    /// Disposes the displayed asset, if any. The state becomes `Empty`.
    pub fn clear(&mut self) -> Result<DisposeReport> {
        self.ensure_open()?;
        let report = self.dispose_current();
        self.state = SessionState::Empty;
        Ok(report)
    }

    fn dispose_current(&mut self) -> DisposeReport {
        match self.current.take() {
            Some(displayed) => lifecycle::dispose(&mut self.scene, displayed.root),
            None => DisposeReport::default(),
        }
    }

    /// Places the camera along (1, 1, 1) from the box centre, far enough
    /// for the largest dimension to fill the view with padding.
    fn fit_camera(&mut self, bbox: &BoundingBox) {
        let center = bbox.center();
        let distance = self.camera.fit_distance(bbox.max_dimension()) * self.options.fit_padding;
        if !distance.is_finite() || distance <= f32::EPSILON {
            self.controls.set_target(center);
            return;
        }

        let position = center + Vec3::ONE.normalize() * distance;
        self.controls.set_target(center);
        self.controls.set_position(position);

        self.camera_transform.position = position;
        self.camera_transform.look_at(center, Vec3::Y);
        self.sync_camera();
    }

    // ========================================================================
    // Frame loop
    // ========================================================================

    /// Advances one frame using the wall-clock delta since the last frame.
    pub fn frame(&mut self) -> Result<()> {
        self.ensure_open()?;
        let dt = self.timer.tick();
        self.advance(dt)
    }

    /// Advances one frame by `dt` seconds: pending resizes are applied,
    /// then every [`FRAME_STEPS`] entry runs in order.
    pub fn advance(&mut self, dt: f32) -> Result<()> {
        self.ensure_open()?;

        let latest_size = self
            .resize_rx
            .as_ref()
            .and_then(|rx| rx.try_iter().last());
        if let Some(size) = latest_size {
            self.resize(size)?;
        }

        for step in FRAME_STEPS {
            match step {
                FrameStep::UpdateControls => {
                    self.controls.update(&mut self.camera_transform, dt);
                    self.sync_camera();
                }
                FrameStep::AdvanceAnimation => {
                    if let Some(displayed) = &mut self.current
                        && displayed.mixer.running().next().is_some()
                    {
                        displayed.mixer.update(dt, &mut self.scene);
                    }
                    self.scene.update_matrix_world();
                }
                FrameStep::Render => {
                    let view = FrameView {
                        scene: &self.scene,
                        camera: &self.camera,
                        camera_transform: &self.camera_transform,
                        lights: &self.lights,
                        background: self.options.background,
                    };
                    self.surface.present(&view)?;
                }
            }
        }
        Ok(())
    }

    /// Updates the camera aspect and the surface's render-target size.
    pub fn resize(&mut self, size: SurfaceSize) -> Result<()> {
        self.ensure_open()?;
        let physical = size.physical(self.options.pixel_ratio_cap);
        self.surface.configure(size, physical);
        if let Some(aspect) = size.aspect() {
            self.camera.set_aspect(aspect);
        }
        log::debug!(
            "Surface resized to {}x{} ({}x{} physical)",
            size.width,
            size.height,
            physical.0,
            physical.1
        );
        Ok(())
    }

    fn sync_camera(&mut self) {
        self.camera_transform.update_local_matrix();
        let world = *self.camera_transform.local_matrix();
        self.camera_transform.set_world_matrix(world);
        self.camera.update_view_projection(&world);
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// Stops the loop, stops observing resizes, disposes the displayed
    /// asset and the surface. Closing twice is a no-op.
    pub fn close(&mut self) {
        if self.state == SessionState::Disposed {
            return;
        }
        self.running = false;
        self.resize_rx = None;

        let report = self.dispose_current();
        for helper in std::mem::take(&mut self.helpers) {
            lifecycle::dispose(&mut self.scene, helper);
        }
        self.surface.dispose();
        self.state = SessionState::Disposed;
        log::info!("Viewer session closed ({} nodes released)", report.nodes);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == SessionState::Disposed {
            Err(Error::SessionClosed)
        } else {
            Ok(())
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    #[must_use]
    pub fn summary(&self) -> Option<&AssetSummary> {
        self.current.as_ref().map(|d| &d.summary)
    }

    #[must_use]
    pub fn current_root(&self) -> Option<NodeHandle> {
        self.current.as_ref().map(|d| d.root)
    }

    #[must_use]
    pub fn mixer(&self) -> Option<&AnimationMixer> {
        self.current.as_ref().map(|d| &d.mixer)
    }

    pub fn mixer_mut(&mut self) -> Option<&mut AnimationMixer> {
        self.current.as_mut().map(|d| &mut d.mixer)
    }

    #[must_use]
    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    #[must_use]
    pub fn camera(&self) -> &PerspectiveCamera {
        &self.camera
    }

    #[must_use]
    pub fn camera_transform(&self) -> &Transform {
        &self.camera_transform
    }

    #[must_use]
    pub fn controls(&self) -> &OrbitControls {
        &self.controls
    }

    /// Feed pointer input here; it is applied on the next frame.
    pub fn controls_mut(&mut self) -> &mut OrbitControls {
        &mut self.controls
    }

    #[must_use]
    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    /// Grid and axes nodes, in creation order.
    #[must_use]
    pub fn helpers(&self) -> &[NodeHandle] {
        &self.helpers
    }

    #[must_use]
    pub fn options(&self) -> &ViewerOptions {
        &self.options
    }

    #[must_use]
    pub fn dispatcher(&self) -> &Arc<FormatDispatcher> {
        &self.dispatcher
    }

    #[must_use]
    pub fn surface(&self) -> &S {
        &self.surface
    }
}

/// Adds an unlit vertex-colored line helper at the scene root.
fn add_helper(scene: &mut Scene, geometry: Geometry) -> NodeHandle {
    let name = geometry.name.clone();
    let geometry = scene.assets.geometries.add(geometry);
    let material = scene
        .assets
        .materials
        .add(Material::new_basic(Vec4::ONE).with_vertex_colors(true).with_name(&name));
    scene.add_mesh(Mesh::new(geometry, material).with_name(name), None)
}
