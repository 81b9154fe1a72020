//! Viewer Session Tests
//!
//! Tests for:
//! - Opening: surface configuration, helpers, lights
//! - Loading: summary, camera fit, replacement of the displayed asset
//! - Resources a replaced asset brought in but never drew
//! - Replace policies on failed loads
//! - First animation clip looping through the frame loop
//! - Resize propagation and surface errors
//! - Closing: teardown, resize disconnection, idempotence

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use glam::{Vec3, Vec4};
use serde_json::json;

use curio::animation::{AnimationClip, InterpolationMode, KeyframeTrack, TargetPath, Track, TrackData, TrackMeta};
use curio::assets::{FormatDispatcher, LoadRequest, LoadResult, Locator, ModelFormat, Prefab};
use curio::config::{LoaderConfig, ReplacePolicy, ViewerOptions};
use curio::errors::Error;
use curio::normalize::normalize;
use curio::resources::{Geometry, Material};
use curio::viewer::{HeadlessHandle, HeadlessSurface, SessionState, SurfaceSize, ViewerSession};

const EPSILON: f32 = 1e-4;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

fn ascii_stl(name: &str, scale: f32) -> String {
    format!(
        "solid {name}
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex {scale} 0 0
      vertex 0 {scale} 0
    endloop
  endfacet
endsolid {name}
"
    )
}

struct Fixture {
    session: ViewerSession<HeadlessSurface>,
    handle: HeadlessHandle,
    dispatcher: Arc<FormatDispatcher>,
}

fn open(options: ViewerOptions) -> Fixture {
    let _ = env_logger::builder().is_test(true).try_init();
    let dispatcher = Arc::new(FormatDispatcher::new(LoaderConfig::default()));
    let (surface, handle) = HeadlessSurface::new(SurfaceSize::new(800, 600).with_pixel_ratio(3.0));
    let session = ViewerSession::open(surface, options, Arc::clone(&dispatcher)).unwrap();
    Fixture {
        session,
        handle,
        dispatcher,
    }
}

fn insert_stl(dispatcher: &FormatDispatcher, key: &str, scale: f32) -> Locator {
    let name = key.rsplit('/').next().unwrap_or(key).trim_end_matches(".stl");
    dispatcher
        .memory()
        .insert(&format!("mem://{key}"), ascii_stl(name, scale))
        .unwrap()
}

/// A one-mesh prefab whose `box` node slides along X over one second.
fn animated_result() -> LoadResult {
    let mut prefab = Prefab::new("slider");
    let material = prefab.assets.materials.add(Material::new_basic(Vec4::ONE));
    let mut geometry = Geometry::from_positions(&[Vec3::ZERO, Vec3::X, Vec3::Y]);
    geometry.compute_bounding_volume();
    prefab.add_mesh_node(Prefab::ROOT, "box", geometry, material);
    let normalization = normalize(&mut prefab).unwrap();

    let clip = |name: &str| {
        AnimationClip::new(
            name,
            vec![Track {
                meta: TrackMeta {
                    node_name: "box".to_string(),
                    target: TargetPath::Translation,
                },
                data: TrackData::Vector3(KeyframeTrack::new(
                    vec![0.0, 1.0],
                    vec![Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)],
                    InterpolationMode::Linear,
                )),
            }],
        )
    };

    LoadResult {
        format: ModelFormat::Glb,
        prefab,
        animations: vec![clip("slide"), clip("unused")],
        normalization,
    }
}

// ============================================================================
// Opening
// ============================================================================

#[test]
fn open_configures_surface_and_helpers() {
    let f = open(ViewerOptions::default().with_grid(true).with_axes(true));

    assert_eq!(f.session.state(), SessionState::Empty);
    assert!(f.session.is_running());
    assert!(f.session.summary().is_none());
    assert_eq!(f.session.helpers().len(), 2);
    assert_eq!(f.session.scene().root_nodes().len(), 2);
    assert_eq!(f.session.lights().len(), 2);

    // Pixel ratio 3 is capped at 2.
    assert_eq!(f.handle.physical_size(), (1600, 1200));
    assert!((f.session.camera().aspect - 800.0 / 600.0).abs() < EPSILON);
    assert!(f.handle.is_observed());
}

#[test]
fn open_without_helpers_has_an_empty_scene() {
    let f = open(ViewerOptions::default());
    assert!(f.session.helpers().is_empty());
    assert_eq!(f.session.scene().node_count(), 0);
}

// ============================================================================
// Loading
// ============================================================================

#[tokio::test]
async fn load_asset_displays_and_fits_camera() {
    let mut f = open(ViewerOptions::default().with_grid(true));
    let loc = insert_stl(&f.dispatcher, "exhibits/wedge.stl", 4.0);

    let summary = f.session.load_asset(LoadRequest::new(loc)).await.unwrap();
    assert_eq!(f.session.state(), SessionState::Ready);
    assert_eq!(summary.format, ModelFormat::Stl);
    assert_eq!(summary.mesh_count, 1);
    assert_eq!(summary.node_count, 1);
    assert!(!summary.has_animation);
    assert!(summary.active_animation.is_none());
    assert!(vec3_approx(summary.size, Vec3::new(4.0, 4.0, 0.0)));
    assert!(vec3_approx(summary.original_size, summary.size));
    assert!(vec3_approx(summary.bounding_box.center(), Vec3::ZERO));
    assert_eq!(f.session.current_root(), Some(summary.root));
    assert_eq!(f.session.summary(), Some(&summary));

    let center = summary.bounding_box.center();
    let distance = f.session.camera().fit_distance(4.0) * f.session.options().fit_padding;
    let eye = f.session.camera_transform().position;
    assert!(vec3_approx(f.session.controls().target, center));
    assert!(((eye - center).length() - distance).abs() < EPSILON);
    assert!(vec3_approx((eye - center).normalize(), Vec3::ONE.normalize()));
}

#[tokio::test]
async fn second_load_replaces_the_first() {
    let mut f = open(ViewerOptions::default().with_grid(true).with_axes(true));
    let first_loc = insert_stl(&f.dispatcher, "a.stl", 1.0);
    let second_loc = insert_stl(&f.dispatcher, "b.stl", 2.0);

    let first = f.session.load_asset(LoadRequest::new(first_loc)).await.unwrap();
    let second = f.session.load_asset(LoadRequest::new(second_loc)).await.unwrap();

    let scene = f.session.scene();
    assert_eq!(scene.root_nodes().len(), f.session.helpers().len() + 1);
    assert!(scene.get_node(first.root).is_none());
    assert!(scene.get_node(second.root).is_some());
    assert_eq!(scene.mesh_count(), 3);
    assert_eq!(f.session.current_root(), Some(second.root));
}

const SHELF_OBJ: &str = "mtllib shelf.mtl
o shelf
v 0 0 0
v 1 0 0
v 0 1 0
usemtl wood
f 1 2 3
";

const SHELF_MTL: &str = "newmtl wood
Kd 0.6 0.4 0.2
newmtl stone
Kd 0.5 0.5 0.5
newmtl brass
Kd 0.8 0.7 0.2
";

#[tokio::test]
async fn replacing_keeps_only_the_resources_meshes_use() {
    let mut f = open(ViewerOptions::default());
    f.dispatcher.memory().insert("mem://shelf/shelf.mtl", SHELF_MTL).unwrap();
    let loc = f.dispatcher.memory().insert("mem://shelf/shelf.obj", SHELF_OBJ).unwrap();

    for _ in 0..3 {
        f.session.load_asset(LoadRequest::new(loc.clone())).await.unwrap();
        let assets = &f.session.scene().assets;
        assert_eq!(assets.geometries.len(), 1);
        assert_eq!(assets.materials.len(), 1);
        assert_eq!(assets.total(), 2);
    }

    f.session.clear().unwrap();
    assert_eq!(f.session.scene().assets.total(), 0);
}

fn png_data_uri() -> String {
    let image = image::RgbaImage::from_pixel(2, 2, image::Rgba([90, 60, 30, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    image.write_to(&mut out, image::ImageFormat::Png).unwrap();
    format!("data:image/png;base64,{}", STANDARD.encode(out.into_inner()))
}

/// One triangle whose material samples a base colour map and an occlusion map.
fn occluded_gltf() -> String {
    let mut buffer = Vec::new();
    for v in [Vec3::ZERO, Vec3::X, Vec3::Y] {
        buffer.extend_from_slice(bytemuck::cast_slice(v.to_array().as_slice()));
    }
    for i in [0_u16, 1, 2] {
        buffer.extend_from_slice(&i.to_le_bytes());
    }
    json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Vase", "mesh": 0 }],
        "meshes": [{ "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }] }],
        "materials": [{
            "name": "glaze",
            "pbrMetallicRoughness": { "baseColorTexture": { "index": 0 } },
            "occlusionTexture": { "index": 1 }
        }],
        "images": [{ "uri": png_data_uri() }, { "uri": png_data_uri() }],
        "textures": [{ "source": 0 }, { "source": 1 }],
        "buffers": [{
            "byteLength": buffer.len(),
            "uri": format!("data:application/octet-stream;base64,{}", STANDARD.encode(&buffer))
        }],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" }
        ]
    })
    .to_string()
}

#[tokio::test]
async fn unsampled_textures_do_not_outlive_the_asset() {
    let mut f = open(ViewerOptions::default());
    let loc = f.dispatcher.memory().insert("mem://vase.gltf", occluded_gltf()).unwrap();

    for _ in 0..2 {
        f.session.load_asset(LoadRequest::new(loc.clone())).await.unwrap();
        let assets = &f.session.scene().assets;
        assert_eq!(assets.textures.len(), 1);
        assert_eq!(assets.total(), 3);
    }

    f.session.clear().unwrap();
    assert_eq!(f.session.scene().assets.total(), 0);
}

#[tokio::test]
async fn empty_model_is_reported_and_nothing_is_shown() {
    let mut f = open(ViewerOptions::default());
    let loc = f
        .dispatcher
        .memory()
        .insert("mem://empty.obj", "# no faces\n")
        .unwrap();

    let err = f.session.load_asset(LoadRequest::new(loc)).await.unwrap_err();
    assert!(matches!(err, Error::EmptyScene(ModelFormat::Obj)), "{err}");
    assert_eq!(f.session.state(), SessionState::Empty);
    assert_eq!(f.session.scene().node_count(), 0);
}

#[tokio::test]
async fn clear_disposes_the_displayed_asset() {
    let mut f = open(ViewerOptions::default());
    let loc = insert_stl(&f.dispatcher, "c.stl", 1.0);
    f.session.load_asset(LoadRequest::new(loc)).await.unwrap();

    let report = f.session.clear().unwrap();
    assert_eq!(report.nodes, 2);
    assert_eq!(report.meshes, 1);
    assert_eq!(f.session.state(), SessionState::Empty);
    assert!(f.session.current_root().is_none());
    assert_eq!(f.session.scene().assets.total(), 0);
}

// ============================================================================
// Replace policies
// ============================================================================

#[tokio::test]
async fn dispose_before_dispatch_loses_asset_on_failure() {
    let mut f = open(ViewerOptions::default().with_replace_policy(ReplacePolicy::DisposeBeforeDispatch));
    let loc = insert_stl(&f.dispatcher, "kept.stl", 1.0);
    f.session.load_asset(LoadRequest::new(loc)).await.unwrap();

    let pending = f.session.prepare_load(LoadRequest::parse("mem://missing.stl").unwrap()).unwrap();
    assert_eq!(f.session.state(), SessionState::Loading);
    assert!(f.session.current_root().is_none());
    assert_eq!(f.session.scene().node_count(), 0);

    let err = f.session.complete_load(pending.resolve().await).unwrap_err();
    assert!(matches!(err, Error::DecodeFailure { .. }), "{err}");
    assert_eq!(f.session.state(), SessionState::Empty);
    assert!(f.session.summary().is_none());
}

#[tokio::test]
async fn keep_until_ready_survives_failure() {
    let mut f = open(ViewerOptions::default().with_replace_policy(ReplacePolicy::KeepUntilReady));
    let loc = insert_stl(&f.dispatcher, "kept.stl", 1.0);
    let shown = f.session.load_asset(LoadRequest::new(loc)).await.unwrap();

    let pending = f.session.prepare_load(LoadRequest::parse("mem://missing.stl").unwrap()).unwrap();
    assert_eq!(f.session.state(), SessionState::Loading);
    assert_eq!(f.session.current_root(), Some(shown.root));

    assert!(f.session.complete_load(pending.resolve().await).is_err());
    assert_eq!(f.session.state(), SessionState::Ready);
    assert_eq!(f.session.summary(), Some(&shown));
    assert_eq!(f.session.scene().mesh_count(), 1);
}

#[tokio::test]
async fn frames_keep_rendering_while_a_load_is_pending() {
    let mut f = open(ViewerOptions::default().with_replace_policy(ReplacePolicy::KeepUntilReady));
    let first = insert_stl(&f.dispatcher, "first.stl", 1.0);
    let second = insert_stl(&f.dispatcher, "second.stl", 1.0);
    f.session.load_asset(LoadRequest::new(first)).await.unwrap();

    let pending = f.session.prepare_load(LoadRequest::new(second)).unwrap();
    f.session.advance(0.016).unwrap();
    assert_eq!(f.handle.last_mesh_count(), 1);

    let summary = f.session.complete_load(pending.resolve().await).unwrap();
    f.session.advance(0.016).unwrap();
    assert_eq!(f.handle.frames_presented(), 2);
    assert_eq!(f.handle.last_mesh_count(), 1);
    assert_eq!(f.session.current_root(), Some(summary.root));
}

// ============================================================================
// Animation
// ============================================================================

#[test]
fn first_clip_starts_looping() {
    let mut f = open(ViewerOptions::default());
    let summary = f.session.complete_load(Ok(animated_result())).unwrap();

    assert!(summary.has_animation);
    assert_eq!(summary.animations, vec!["slide".to_string(), "unused".to_string()]);
    assert_eq!(summary.active_animation.as_deref(), Some("slide"));

    let running: Vec<usize> = f.session.mixer().unwrap().running().map(|(i, _)| i).collect();
    assert_eq!(running, vec![0]);

    let node = f
        .session
        .scene()
        .find_node_by_name(summary.root, "box")
        .unwrap();

    f.session.advance(0.25).unwrap();
    let x = f.session.scene().get_node(node).unwrap().transform.position.x;
    assert!((x - 2.5).abs() < EPSILON, "x = {x}");

    // 0.25 + 1.0 wraps to 0.25 again.
    f.session.advance(1.0).unwrap();
    let x = f.session.scene().get_node(node).unwrap().transform.position.x;
    assert!((x - 2.5).abs() < EPSILON, "x = {x}");

    for _ in 0..100 {
        f.session.advance(0.1).unwrap();
    }
    assert_eq!(f.session.mixer().unwrap().running().count(), 1);
}

#[test]
fn paused_clip_holds_its_pose() {
    let mut f = open(ViewerOptions::default());
    let summary = f.session.complete_load(Ok(animated_result())).unwrap();
    let node = f.session.scene().find_node_by_name(summary.root, "box").unwrap();

    f.session.advance(0.5).unwrap();
    f.session.mixer_mut().unwrap().action_mut(0).unwrap().paused = true;
    f.session.advance(0.25).unwrap();

    let x = f.session.scene().get_node(node).unwrap().transform.position.x;
    assert!((x - 5.0).abs() < EPSILON, "x = {x}");
    assert_eq!(f.session.mixer().unwrap().running().count(), 0);
}

// ============================================================================
// Frames and resizing
// ============================================================================

#[tokio::test]
async fn advance_presents_one_frame_per_call() {
    let mut f = open(ViewerOptions::default().with_grid(true).with_axes(true));
    let loc = insert_stl(&f.dispatcher, "frame.stl", 1.0);
    f.session.load_asset(LoadRequest::new(loc)).await.unwrap();

    for _ in 0..3 {
        f.session.advance(0.016).unwrap();
    }
    assert_eq!(f.handle.frames_presented(), 3);
    assert_eq!(f.handle.last_mesh_count(), 3);
    assert_eq!(f.handle.last_light_count(), 2);
}

#[test]
fn resize_events_reach_camera_and_surface() {
    let mut f = open(ViewerOptions::default());

    assert!(f.handle.resize(SurfaceSize::new(640, 480)));
    assert!(f.handle.resize(SurfaceSize::new(400, 100)));
    f.session.advance(0.016).unwrap();

    assert!((f.session.camera().aspect - 4.0).abs() < EPSILON);
    assert_eq!(f.handle.configured_size(), SurfaceSize::new(400, 100));
    assert_eq!(f.handle.physical_size(), (400, 100));
}

#[test]
fn zero_height_resize_keeps_aspect() {
    let mut f = open(ViewerOptions::default());
    let before = f.session.camera().aspect;
    f.session.resize(SurfaceSize::new(300, 0)).unwrap();
    assert!((f.session.camera().aspect - before).abs() < EPSILON);
}

#[test]
fn surface_errors_propagate() {
    let mut f = open(ViewerOptions::default());
    f.handle.fail_next_present("device lost");

    let err = f.session.advance(0.016).unwrap_err();
    assert!(matches!(err, Error::Surface(ref m) if m == "device lost"), "{err}");
    f.session.advance(0.016).unwrap();
    assert_eq!(f.handle.frames_presented(), 1);
}

#[tokio::test]
async fn controls_input_moves_the_camera_on_the_next_frame() {
    let mut options = ViewerOptions::default().with_background([0.1, 0.1, 0.12, 1.0]);
    options.enable_damping = false;
    let mut f = open(options);
    assert_eq!(f.session.options().background, Some([0.1, 0.1, 0.12, 1.0]));

    let loc = insert_stl(&f.dispatcher, "zoom.stl", 2.0);
    let summary = f.session.load_asset(LoadRequest::new(loc)).await.unwrap();
    let center = summary.bounding_box.center();
    let before = (f.session.camera_transform().position - center).length();

    f.session.controls_mut().zoom(5.0);
    f.session.advance(0.016).unwrap();

    let after = (f.session.camera_transform().position - center).length();
    assert!(after < before, "{after} >= {before}");
    assert!(vec3_approx(f.session.controls().target, center));
}

// ============================================================================
// Closing
// ============================================================================

#[tokio::test]
async fn close_releases_everything() {
    let mut f = open(ViewerOptions::default().with_grid(true).with_axes(true));
    let loc = insert_stl(&f.dispatcher, "gone.stl", 1.0);
    f.session.load_asset(LoadRequest::new(loc.clone())).await.unwrap();

    f.session.close();
    assert_eq!(f.session.state(), SessionState::Disposed);
    assert!(!f.session.is_running());
    assert!(f.handle.is_disposed());
    assert!(!f.handle.is_observed());
    assert!(!f.handle.resize(SurfaceSize::new(10, 10)));
    assert_eq!(f.session.scene().node_count(), 0);
    assert_eq!(f.session.scene().assets.total(), 0);

    assert!(matches!(f.session.advance(0.016), Err(Error::SessionClosed)));
    assert!(matches!(f.session.frame(), Err(Error::SessionClosed)));
    assert!(matches!(f.session.clear(), Err(Error::SessionClosed)));
    assert!(matches!(
        f.session.load_asset(LoadRequest::new(loc)).await,
        Err(Error::SessionClosed)
    ));
}

#[test]
fn close_is_idempotent() {
    let mut f = open(ViewerOptions::default());
    f.session.close();
    f.session.close();
    assert_eq!(f.session.state(), SessionState::Disposed);
}

#[tokio::test]
async fn load_resolved_after_close_is_discarded() {
    let mut f = open(ViewerOptions::default());
    let loc = insert_stl(&f.dispatcher, "late.stl", 1.0);

    let pending = f.session.prepare_load(LoadRequest::new(loc)).unwrap();
    f.session.close();
    let outcome = pending.resolve().await;
    assert!(outcome.is_ok());

    assert!(matches!(f.session.complete_load(outcome), Err(Error::SessionClosed)));
    assert_eq!(f.session.scene().node_count(), 0);
}
