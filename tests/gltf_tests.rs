//! glTF / GLB Decoder Tests
//!
//! Tests for:
//! - Embedded (data URI), external and GLB binary buffers
//! - Node hierarchy, PBR materials and animation clips
//! - Draco-compressed primitives with and without a registered decoder

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine;
use glam::Vec3;
use parking_lot::Mutex;
use serde_json::{Value, json};

use curio::assets::{DracoDecoder, DracoMesh, FormatDispatcher, LoadRequest, LoadResult, ModelFormat};
use curio::config::LoaderConfig;
use curio::errors::{DecodeError, Error};
use curio::resources::{MaterialKind, Side};

const EPSILON: f32 = 1e-5;

fn vec3_approx(a: Vec3, b: Vec3) -> bool {
    (a - b).length() < EPSILON
}

fn dispatcher() -> FormatDispatcher {
    let _ = env_logger::builder().is_test(true).try_init();
    FormatDispatcher::new(LoaderConfig::default())
}

// ============================================================================
// Fixtures
// ============================================================================

/// Positions (36) | indices (6 + 2 pad) | times (8) | translations (24).
fn buffer_bytes() -> Vec<u8> {
    let mut bytes = Vec::with_capacity(76);
    for v in [Vec3::ZERO, Vec3::X, Vec3::Y] {
        bytes.extend_from_slice(bytemuck::cast_slice(v.to_array().as_slice()));
    }
    for i in [0_u16, 1, 2, 0] {
        bytes.extend_from_slice(&i.to_le_bytes());
    }
    for t in [0.0_f32, 1.0] {
        bytes.extend_from_slice(&t.to_le_bytes());
    }
    for v in [Vec3::new(0.0, 2.0, 0.0), Vec3::new(0.0, 3.0, 0.0)] {
        bytes.extend_from_slice(bytemuck::cast_slice(v.to_array().as_slice()));
    }
    assert_eq!(bytes.len(), 76);
    bytes
}

fn data_uri(bytes: &[u8]) -> String {
    format!(
        "data:application/octet-stream;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// One untextured triangle on `Body`, a `Marker` child and two clips.
fn document(buffer: Value) -> Value {
    json!({
        "asset": { "version": "2.0" },
        "scene": 0,
        "scenes": [{ "nodes": [0] }],
        "nodes": [
            { "name": "Body", "mesh": 0, "children": [1] },
            { "name": "Marker", "translation": [0.0, 2.0, 0.0] }
        ],
        "meshes": [{
            "name": "tri",
            "primitives": [{ "attributes": { "POSITION": 0 }, "indices": 1, "material": 0 }]
        }],
        "materials": [{
            "name": "paint",
            "pbrMetallicRoughness": {
                "baseColorFactor": [1.0, 0.0, 0.0, 1.0],
                "metallicFactor": 0.0,
                "roughnessFactor": 0.5
            }
        }],
        "buffers": [buffer],
        "bufferViews": [
            { "buffer": 0, "byteOffset": 0, "byteLength": 36 },
            { "buffer": 0, "byteOffset": 36, "byteLength": 6 },
            { "buffer": 0, "byteOffset": 44, "byteLength": 8 },
            { "buffer": 0, "byteOffset": 52, "byteLength": 24 }
        ],
        "accessors": [
            { "bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
              "min": [0.0, 0.0, 0.0], "max": [1.0, 1.0, 0.0] },
            { "bufferView": 1, "componentType": 5123, "count": 3, "type": "SCALAR" },
            { "bufferView": 2, "componentType": 5126, "count": 2, "type": "SCALAR",
              "min": [0.0], "max": [1.0] },
            { "bufferView": 3, "componentType": 5126, "count": 2, "type": "VEC3" }
        ],
        "animations": [
            {
                "name": "bob",
                "channels": [{ "sampler": 0, "target": { "node": 1, "path": "translation" } }],
                "samplers": [{ "input": 2, "output": 3 }]
            },
            {
                "name": "drift",
                "channels": [{ "sampler": 0, "target": { "node": 0, "path": "translation" } }],
                "samplers": [{ "input": 2, "output": 3, "interpolation": "STEP" }]
            }
        ]
    })
}

fn embedded_gltf() -> String {
    let buffer = buffer_bytes();
    document(json!({ "byteLength": buffer.len(), "uri": data_uri(&buffer) })).to_string()
}

fn glb(json: &Value, bin: &[u8]) -> Vec<u8> {
    let mut json = serde_json::to_vec(json).unwrap();
    while json.len() % 4 != 0 {
        json.push(b' ');
    }
    let mut bin = bin.to_vec();
    while bin.len() % 4 != 0 {
        bin.push(0);
    }

    let total = 12 + 8 + json.len() + 8 + bin.len();
    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"glTF");
    out.extend_from_slice(&2_u32.to_le_bytes());
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&(json.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x4E4F_534A_u32.to_le_bytes());
    out.extend_from_slice(&json);
    out.extend_from_slice(&(bin.len() as u32).to_le_bytes());
    out.extend_from_slice(&0x004E_4942_u32.to_le_bytes());
    out.extend_from_slice(&bin);
    out
}

fn assert_triangle_model(result: &LoadResult) {
    let prefab = &result.prefab;
    assert_eq!(prefab.node_count(), 3);
    assert_eq!(prefab.mesh_count(), 1);

    let body = &prefab.nodes[1];
    assert_eq!(body.name, "Body");
    assert_eq!(body.parent, Some(0));
    let marker = &prefab.nodes[2];
    assert_eq!(marker.name, "Marker");
    assert_eq!(marker.parent, Some(1));
    assert!(vec3_approx(marker.transform.position, Vec3::new(0.0, 2.0, 0.0)));

    let mesh = body.mesh.as_ref().unwrap();
    let geometry = prefab.assets.geometries.get(mesh.geometry).unwrap();
    assert_eq!(geometry.indices(), Some(vec![0, 1, 2]));
    assert!(geometry.normals().is_some());

    let material = prefab.assets.materials.get(mesh.material).unwrap();
    assert_eq!(material.name, "paint");
    assert_eq!(material.side, Side::Double);
    match material.kind {
        MaterialKind::Standard { roughness, metalness } => {
            assert!((roughness - 0.5).abs() < EPSILON);
            assert!(metalness.abs() < EPSILON);
        }
        other => panic!("expected Standard, got {other:?}"),
    }

    assert!(vec3_approx(result.normalization.center, Vec3::new(0.5, 0.5, 0.0)));
}

// ============================================================================
// Buffers
// ============================================================================

#[tokio::test]
async fn gltf_with_embedded_buffer() {
    let dispatcher = dispatcher();
    let loc = dispatcher.memory().insert("mem://tri.gltf", embedded_gltf()).unwrap();

    let result = dispatcher.load(LoadRequest::new(loc)).await.unwrap();
    assert_eq!(result.format, ModelFormat::Gltf);
    assert_eq!(result.prefab.root().name, "tri");
    assert_triangle_model(&result);
}

#[tokio::test]
async fn gltf_with_external_buffer() {
    let dispatcher = dispatcher();
    let memory = dispatcher.memory();
    let doc = document(json!({ "byteLength": 76, "uri": "data/tri.bin" }));
    let loc = memory.insert("mem://assets/tri.gltf", doc.to_string()).unwrap();
    memory.insert("mem://assets/data/tri.bin", buffer_bytes()).unwrap();

    let result = dispatcher.load(LoadRequest::new(loc)).await.unwrap();
    assert_triangle_model(&result);
}

#[tokio::test]
async fn gltf_missing_external_buffer_fails() {
    let dispatcher = dispatcher();
    let doc = document(json!({ "byteLength": 76, "uri": "nowhere.bin" }));
    let loc = dispatcher.memory().insert("mem://lost.gltf", doc.to_string()).unwrap();

    let err = dispatcher.load(LoadRequest::new(loc)).await.unwrap_err();
    assert!(
        matches!(err, Error::DecodeFailure { format: ModelFormat::Gltf, cause: DecodeError::Transport(_) }),
        "{err}"
    );
}

#[tokio::test]
async fn gltf_short_buffer_is_malformed() {
    let dispatcher = dispatcher();
    let short = &buffer_bytes()[..40];
    let doc = document(json!({ "byteLength": 76, "uri": data_uri(short) }));
    let loc = dispatcher.memory().insert("mem://short.gltf", doc.to_string()).unwrap();

    let err = dispatcher.load(LoadRequest::new(loc)).await.unwrap_err();
    assert!(
        matches!(err, Error::DecodeFailure { cause: DecodeError::Malformed(_), .. }),
        "{err}"
    );
}

#[tokio::test]
async fn glb_with_binary_chunk() {
    let dispatcher = dispatcher();
    let buffer = buffer_bytes();
    let bytes = glb(&document(json!({ "byteLength": buffer.len() })), &buffer);
    let loc = dispatcher.memory().insert("mem://models/tri.glb", bytes).unwrap();

    let result = dispatcher.load(LoadRequest::new(loc)).await.unwrap();
    assert_eq!(result.format, ModelFormat::Glb);
    assert_triangle_model(&result);
}

#[tokio::test]
async fn invalid_json_is_a_gltf_error() {
    let dispatcher = dispatcher();
    let loc = dispatcher.memory().insert("mem://broken.gltf", "{ not json").unwrap();

    let err = dispatcher.load(LoadRequest::new(loc)).await.unwrap_err();
    assert!(
        matches!(err, Error::DecodeFailure { cause: DecodeError::Gltf(_), .. }),
        "{err}"
    );
}

// ============================================================================
// Animations
// ============================================================================

#[tokio::test]
async fn animation_clips_are_returned_in_file_order() {
    let dispatcher = dispatcher();
    let loc = dispatcher.memory().insert("mem://anim.gltf", embedded_gltf()).unwrap();

    let result = dispatcher.load(LoadRequest::new(loc)).await.unwrap();
    let names: Vec<&str> = result.animations.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, ["bob", "drift"]);
    assert!(result.prefab.animations.is_empty());

    let bob = &result.animations[0];
    assert!((bob.duration - 1.0).abs() < EPSILON);
    assert_eq!(bob.tracks.len(), 1);
    assert_eq!(bob.tracks[0].meta.node_name, "Marker");
}

// ============================================================================
// Draco
// ============================================================================

fn draco_document() -> String {
    let buffer = buffer_bytes();
    json!({
        "asset": { "version": "2.0" },
        "extensionsUsed": ["KHR_draco_mesh_compression"],
        "extensionsRequired": ["KHR_draco_mesh_compression"],
        "scenes": [{ "nodes": [0] }],
        "nodes": [{ "name": "Packed", "mesh": 0 }],
        "meshes": [{
            "primitives": [{
                "attributes": { "POSITION": 0 },
                "extensions": {
                    "KHR_draco_mesh_compression": { "bufferView": 0, "attributes": { "POSITION": 0 } }
                }
            }]
        }],
        "buffers": [{ "byteLength": buffer.len(), "uri": data_uri(&buffer) }],
        "bufferViews": [{ "buffer": 0, "byteOffset": 0, "byteLength": 36 }],
        "accessors": [{ "componentType": 5126, "count": 3, "type": "VEC3" }]
    })
    .to_string()
}

#[derive(Default)]
struct MockDraco {
    init_paths: Mutex<Vec<String>>,
    decodes: AtomicUsize,
}

impl DracoDecoder for MockDraco {
    fn initialize(&self, decoder_path: &str) -> Result<(), String> {
        self.init_paths.lock().push(decoder_path.to_string());
        Ok(())
    }

    fn decode(&self, data: &[u8], attributes: &[(String, u32)]) -> Result<DracoMesh, String> {
        assert_eq!(data.len(), 36);
        assert_eq!(attributes.len(), 1);
        assert_eq!(attributes[0].0, "POSITION");
        self.decodes.fetch_add(1, Ordering::SeqCst);
        Ok(DracoMesh {
            positions: vec![Vec3::ZERO, Vec3::new(4.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)],
            indices: vec![0, 1, 2],
            ..DracoMesh::default()
        })
    }
}

#[tokio::test]
async fn draco_without_decoder_fails() {
    let dispatcher = dispatcher();
    let loc = dispatcher.memory().insert("mem://packed.gltf", draco_document()).unwrap();

    let err = dispatcher.load(LoadRequest::new(loc)).await.unwrap_err();
    assert!(
        matches!(err, Error::DecodeFailure { format: ModelFormat::Gltf, cause: DecodeError::Draco(_) }),
        "{err}"
    );
}

#[tokio::test]
async fn draco_decoder_is_initialised_once() {
    let config = LoaderConfig {
        draco_decoder_path: "/static/draco/".to_string(),
        ..LoaderConfig::default()
    };
    let mut dispatcher = FormatDispatcher::new(config);
    let draco = Arc::new(MockDraco::default());
    dispatcher.set_draco_decoder(draco.clone());
    let loc = dispatcher.memory().insert("mem://packed.gltf", draco_document()).unwrap();

    for _ in 0..2 {
        let result = dispatcher.load(LoadRequest::new(loc.clone())).await.unwrap();
        assert!(vec3_approx(result.normalization.original_size, Vec3::new(4.0, 2.0, 0.0)));
    }

    assert_eq!(*draco.init_paths.lock(), vec!["/static/draco/".to_string()]);
    assert_eq!(draco.decodes.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn draco_initialisation_failure_is_reported() {
    struct Broken;
    impl DracoDecoder for Broken {
        fn initialize(&self, _: &str) -> Result<(), String> {
            Err("decoder assets missing".to_string())
        }
        fn decode(&self, _: &[u8], _: &[(String, u32)]) -> Result<DracoMesh, String> {
            unreachable!("never initialised")
        }
    }

    let mut dispatcher = dispatcher();
    dispatcher.set_draco_decoder(Arc::new(Broken));
    let loc = dispatcher.memory().insert("mem://packed.gltf", draco_document()).unwrap();

    let err = dispatcher.load(LoadRequest::new(loc)).await.unwrap_err();
    match err {
        Error::DecodeFailure { cause: DecodeError::Draco(message), .. } => {
            assert!(message.contains("missing"), "{message}");
        }
        other => panic!("expected Draco failure, got {other}"),
    }
}
