//! FBX Decoder Tests
//!
//! Binary FBX fixtures are assembled in-memory with a small record writer.
//!
//! Tests for:
//! - Model hierarchy and local transforms from `Properties70`
//! - Polygon geometry (fan triangulation, compressed arrays)
//! - Materials and the fallback material
//! - Animation stacks bound through `OP` connections
//! - Rejection of ASCII, truncated and deeply nested input

use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;
use glam::Vec3;

use curio::animation::{TargetPath, TrackData};
use curio::assets::{FormatDispatcher, LoadRequest, LoadResult, ModelFormat};
use curio::assets::loaders::fbx::TICKS_PER_SECOND;
use curio::config::LoaderConfig;
use curio::errors::{DecodeError, Error};
use curio::resources::MaterialKind;

const EPSILON: f32 = 1e-5;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

// ============================================================================
// Record writer
// ============================================================================

enum Prop {
    I64(i64),
    F64(f64),
    Str(String),
    F64Array(Vec<f64>),
    F64ArrayZlib(Vec<f64>),
    I32Array(Vec<i32>),
    I64Array(Vec<i64>),
    F32Array(Vec<f32>),
}

fn s(value: &str) -> Prop {
    Prop::Str(value.to_string())
}

struct Record {
    name: &'static str,
    props: Vec<Prop>,
    children: Vec<Record>,
}

fn record(name: &'static str, props: Vec<Prop>, children: Vec<Record>) -> Record {
    Record { name, props, children }
}

/// `P` entry of a `Properties70` block holding three doubles.
fn p_vec3(name: &str, kind: &str, v: [f64; 3]) -> Record {
    record(
        "P",
        vec![s(name), s(kind), s(""), s("A"), Prop::F64(v[0]), Prop::F64(v[1]), Prop::F64(v[2])],
        vec![],
    )
}

fn connection(kind: &str, child: i64, parent: i64, property: Option<&str>) -> Record {
    let mut props = vec![s(kind), Prop::I64(child), Prop::I64(parent)];
    props.extend(property.map(s));
    record("C", props, vec![])
}

fn write_array(out: &mut Vec<u8>, code: u8, count: usize, raw: &[u8], compress: bool) {
    out.push(code);
    out.extend_from_slice(&(count as u32).to_le_bytes());
    if compress {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(raw).unwrap();
        let packed = encoder.finish().unwrap();
        out.extend_from_slice(&1_u32.to_le_bytes());
        out.extend_from_slice(&(packed.len() as u32).to_le_bytes());
        out.extend_from_slice(&packed);
    } else {
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&(raw.len() as u32).to_le_bytes());
        out.extend_from_slice(raw);
    }
}

fn write_prop(out: &mut Vec<u8>, prop: &Prop) {
    match prop {
        Prop::I64(v) => {
            out.push(b'L');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Prop::F64(v) => {
            out.push(b'D');
            out.extend_from_slice(&v.to_le_bytes());
        }
        Prop::Str(v) => {
            out.push(b'S');
            out.extend_from_slice(&(v.len() as u32).to_le_bytes());
            out.extend_from_slice(v.as_bytes());
        }
        Prop::F64Array(v) => write_array(out, b'd', v.len(), bytemuck::cast_slice(v.as_slice()), false),
        Prop::F64ArrayZlib(v) => write_array(out, b'd', v.len(), bytemuck::cast_slice(v.as_slice()), true),
        Prop::I32Array(v) => write_array(out, b'i', v.len(), bytemuck::cast_slice(v.as_slice()), false),
        Prop::I64Array(v) => write_array(out, b'l', v.len(), bytemuck::cast_slice(v.as_slice()), false),
        Prop::F32Array(v) => write_array(out, b'f', v.len(), bytemuck::cast_slice(v.as_slice()), false),
    }
}

/// 32-bit record layout (version 7400).
fn write_record(out: &mut Vec<u8>, node: &Record) {
    let start = out.len();
    out.extend_from_slice(&[0_u8; 12]);
    out.push(node.name.len() as u8);
    out.extend_from_slice(node.name.as_bytes());

    let props_start = out.len();
    for prop in &node.props {
        write_prop(out, prop);
    }
    let props_len = out.len() - props_start;

    for child in &node.children {
        write_record(out, child);
    }
    if !node.children.is_empty() {
        out.extend_from_slice(&[0_u8; 13]);
    }

    let end = out.len();
    out[start..start + 4].copy_from_slice(&(end as u32).to_le_bytes());
    out[start + 4..start + 8].copy_from_slice(&(node.props.len() as u32).to_le_bytes());
    out[start + 8..start + 12].copy_from_slice(&(props_len as u32).to_le_bytes());
}

fn fbx_header() -> Vec<u8> {
    let mut out = b"Kaydara FBX Binary  \0".to_vec();
    out.extend_from_slice(&[0x1a, 0x00]);
    out.extend_from_slice(&7400_u32.to_le_bytes());
    out
}

/// Closing null record followed by the 7.x footer.
fn finish_file(out: &mut Vec<u8>) {
    const FOOT_ID: [u8; 16] = [
        0xfa, 0xbc, 0xab, 0x09, 0xd0, 0xc8, 0xd4, 0x66, 0xb1, 0x76, 0xfb, 0x83, 0x1c, 0xf7, 0x26, 0x7e,
    ];
    const FOOT_MAGIC: [u8; 16] = [
        0xf8, 0x5a, 0x8c, 0x6a, 0xde, 0xf5, 0xd9, 0x7e, 0xec, 0xe9, 0x0c, 0xe3, 0x75, 0x8f, 0x29, 0x0b,
    ];
    out.extend_from_slice(&[0_u8; 13]);
    out.extend_from_slice(&FOOT_ID);
    out.extend_from_slice(&[0_u8; 4]);
    let padding = match out.len() % 16 {
        0 => 16,
        rem => 16 - rem,
    };
    out.resize(out.len() + padding, 0);
    out.extend_from_slice(&7400_u32.to_le_bytes());
    out.extend_from_slice(&[0_u8; 120]);
    out.extend_from_slice(&FOOT_MAGIC);
}

fn fbx_file(records: &[Record]) -> Vec<u8> {
    let mut out = fbx_header();
    for node in records {
        write_record(&mut out, node);
    }
    finish_file(&mut out);
    out
}

/// `depth` records named `N`, each the only child of the previous one.
/// Written without recursion so the fixture itself stays shallow.
fn nested_fbx(depth: usize) -> Vec<u8> {
    const HEADER: usize = 14;
    let mut out = fbx_header();
    let base = out.len();
    let innermost_end = base + HEADER * depth;
    for i in 0..depth {
        let end = if i + 1 == depth {
            innermost_end
        } else {
            innermost_end + 13 * (depth - 1 - i)
        };
        out.extend_from_slice(&(end as u32).to_le_bytes());
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.extend_from_slice(&0_u32.to_le_bytes());
        out.push(1);
        out.push(b'N');
    }
    for _ in 1..depth {
        out.extend_from_slice(&[0_u8; 13]);
    }
    finish_file(&mut out);
    out
}

// ============================================================================
// Fixture
// ============================================================================

/// `Panel` (a 2x1 quad, translated by +1 on X) with a `Child` null node and
/// one take that slides `Panel` from x=1 to x=3.
fn panel_fbx(with_material: bool) -> Vec<u8> {
    let ticks = TICKS_PER_SECOND as i64;

    let mut objects = vec![
        record(
            "Geometry",
            vec![Prop::I64(100), s("Quad\u{0}\u{1}Geometry"), s("Mesh")],
            vec![
                record(
                    "Vertices",
                    vec![Prop::F64ArrayZlib(vec![0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 2.0, 1.0, 0.0, 0.0, 1.0, 0.0])],
                    vec![],
                ),
                record("PolygonVertexIndex", vec![Prop::I32Array(vec![0, 1, 2, -4])], vec![]),
            ],
        ),
        record(
            "Model",
            vec![Prop::I64(200), s("Panel\u{0}\u{1}Model"), s("Mesh")],
            vec![record(
                "Properties70",
                vec![],
                vec![p_vec3("Lcl Translation", "Lcl Translation", [1.0, 0.0, 0.0])],
            )],
        ),
        record("Model", vec![Prop::I64(201), s("Child\u{0}\u{1}Model"), s("Null")], vec![]),
        record("AnimationStack", vec![Prop::I64(400), s("Take 001\u{0}\u{1}AnimStack"), s("")], vec![]),
        record("AnimationLayer", vec![Prop::I64(401), s("BaseLayer\u{0}\u{1}AnimLayer"), s("")], vec![]),
        record("AnimationCurveNode", vec![Prop::I64(500), s("T\u{0}\u{1}AnimCurveNode"), s("")], vec![]),
        record(
            "AnimationCurve",
            vec![Prop::I64(600), s("\u{0}\u{1}AnimCurve"), s("")],
            vec![
                record("KeyTime", vec![Prop::I64Array(vec![0, ticks])], vec![]),
                record("KeyValueFloat", vec![Prop::F32Array(vec![1.0, 3.0])], vec![]),
            ],
        ),
    ];
    let mut connections = vec![
        connection("OO", 200, 0, None),
        connection("OO", 201, 200, None),
        connection("OO", 100, 200, None),
        connection("OO", 401, 400, None),
        connection("OO", 500, 401, None),
        connection("OP", 500, 200, Some("Lcl Translation")),
        connection("OP", 600, 500, Some("d|X")),
    ];

    if with_material {
        objects.push(record(
            "Material",
            vec![Prop::I64(300), s("Brass\u{0}\u{1}Material"), s("")],
            vec![record(
                "Properties70",
                vec![],
                vec![p_vec3("DiffuseColor", "Color", [1.0, 0.5, 0.0])],
            )],
        ));
        connections.push(connection("OO", 300, 200, None));
    }

    fbx_file(&[
        record("FBXHeaderExtension", vec![], vec![record("FBXVersion", vec![Prop::I64(7400)], vec![])]),
        record("Objects", vec![], objects),
        record("Connections", vec![], connections),
    ])
}

async fn load_panel(with_material: bool) -> LoadResult {
    let _ = env_logger::builder().is_test(true).try_init();
    let dispatcher = FormatDispatcher::new(LoaderConfig::default());
    let loc = dispatcher
        .memory()
        .insert("mem://props/panel.fbx", panel_fbx(with_material))
        .unwrap();
    dispatcher.load(LoadRequest::new(loc)).await.unwrap()
}

// ============================================================================
// Hierarchy and geometry
// ============================================================================

#[tokio::test]
async fn model_tree_follows_connections() {
    let result = load_panel(true).await;
    assert_eq!(result.format, ModelFormat::Fbx);

    let prefab = &result.prefab;
    assert_eq!(prefab.root().name, "panel");
    assert_eq!(prefab.node_count(), 3);
    assert_eq!(prefab.nodes[1].name, "Panel");
    assert_eq!(prefab.nodes[1].parent, Some(0));
    assert_eq!(prefab.nodes[2].name, "Child");
    assert_eq!(prefab.nodes[2].parent, Some(1));
    assert!(prefab.nodes[2].mesh.is_none());
    assert!(vec3_approx(prefab.nodes[1].transform.position, Vec3::X));
}

#[tokio::test]
async fn quad_is_fan_triangulated() {
    let result = load_panel(true).await;
    let prefab = &result.prefab;

    let mesh = prefab.nodes[1].mesh.as_ref().unwrap();
    let geometry = prefab.assets.geometries.get(mesh.geometry).unwrap();
    assert_eq!(geometry.name, "Quad");
    assert_eq!(geometry.vertex_count(), 4);
    assert_eq!(geometry.indices(), Some(vec![0, 1, 2, 0, 2, 3]));
    assert!(geometry.normals().is_some());

    // Local x in [0, 2] shifted by the model's +1 translation.
    assert!(vec3_approx(result.normalization.center, Vec3::new(2.0, 0.5, 0.0)));
    assert!(vec3_approx(result.normalization.original_size, Vec3::new(2.0, 1.0, 0.0)));
}

#[tokio::test]
async fn material_properties_are_read() {
    let result = load_panel(true).await;
    let prefab = &result.prefab;
    let mesh = prefab.nodes[1].mesh.as_ref().unwrap();
    let material = prefab.assets.materials.get(mesh.material).unwrap();

    assert_eq!(material.name, "Brass");
    assert!(vec3_approx(material.color.truncate(), Vec3::new(1.0, 0.5, 0.0)));
    assert!(matches!(material.kind, MaterialKind::Phong { .. }));
}

#[tokio::test]
async fn unconnected_material_falls_back() {
    let result = load_panel(false).await;
    let prefab = &result.prefab;
    let mesh = prefab.nodes[1].mesh.as_ref().unwrap();
    let material = prefab.assets.materials.get(mesh.material).unwrap();
    assert_eq!(material.name, "default");
}

// ============================================================================
// Animation
// ============================================================================

#[tokio::test]
async fn animation_stack_becomes_a_clip() {
    let result = load_panel(true).await;
    assert_eq!(result.animations.len(), 1);

    let clip = &result.animations[0];
    assert_eq!(clip.name, "Take 001");
    assert!((clip.duration - 1.0).abs() < EPSILON);
    assert_eq!(clip.tracks.len(), 1);

    let track = &clip.tracks[0];
    assert_eq!(track.meta.node_name, "Panel");
    assert_eq!(track.meta.target, TargetPath::Translation);
    let TrackData::Vector3(keys) = &track.data else {
        panic!("translation track should hold Vec3 keys");
    };
    assert!(vec3_approx(keys.sample(0.0).unwrap(), Vec3::X));
    assert!(vec3_approx(keys.sample(0.5).unwrap(), Vec3::new(2.0, 0.0, 0.0)));
    assert!(vec3_approx(keys.sample(1.0).unwrap(), Vec3::new(3.0, 0.0, 0.0)));
}

// ============================================================================
// Rejection
// ============================================================================

async fn load_bytes(bytes: &[u8]) -> Error {
    let dispatcher = FormatDispatcher::new(LoaderConfig::default());
    let loc = dispatcher.memory().insert("mem://bad.fbx", bytes).unwrap();
    dispatcher.load(LoadRequest::new(loc)).await.unwrap_err()
}

#[tokio::test]
async fn ascii_fbx_is_rejected() {
    let err = load_bytes(b"; FBX 7.4.0 project file\nFBXHeaderExtension:  {\n}\n").await;
    match err {
        Error::DecodeFailure {
            format: ModelFormat::Fbx,
            cause: DecodeError::Fbx(message),
        } => assert!(message.contains("ASCII"), "{message}"),
        other => panic!("expected FBX decode failure, got {other}"),
    }
}

#[tokio::test]
async fn truncated_binary_is_rejected() {
    let mut bytes = panel_fbx(true);
    bytes.truncate(bytes.len() / 2);
    let err = load_bytes(&bytes).await;
    assert!(
        matches!(err, Error::DecodeFailure { cause: DecodeError::Fbx(_), .. }),
        "{err}"
    );
}

#[tokio::test]
async fn file_without_models_is_empty() {
    let bytes = fbx_file(&[record("Objects", vec![], vec![record("Dummy", vec![Prop::I64(1)], vec![])])]);
    let err = load_bytes(&bytes).await;
    assert!(matches!(err, Error::EmptyScene(ModelFormat::Fbx)), "{err}");
}

#[tokio::test]
async fn deeply_nested_records_do_not_overflow() {
    let bytes = nested_fbx(50_000);
    let err = load_bytes(&bytes).await;
    assert!(
        matches!(err, Error::DecodeFailure { cause: DecodeError::Fbx(_), .. }),
        "{err}"
    );
}
