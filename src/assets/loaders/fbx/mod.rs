//! Autodesk FBX decoder (binary 7.x).
//!
//! Objects and their links are read from the `Objects` and `Connections`
//! sections. `OO` connections build the model tree and attach geometry
//! and materials to models; `OP` connections bind animation curves to
//! curve nodes and curve nodes to model properties.

pub mod binary;

use glam::{EulerRot, Quat, Vec2, Vec3};
use rustc_hash::FxHashMap;

use self::binary::{AttributeExt, FbxDocument, FbxNode};
use crate::animation::{
    AnimationClip, InterpolationMode, KeyframeTrack, TargetPath, Track, TrackData, TrackMeta,
};
use crate::assets::loaders::{DecodeContext, root_name};
use crate::assets::prefab::{Prefab, PrefabNode};
use crate::errors::DecodeError;
use crate::resources::{Geometry, GeometryHandle, Material, MaterialHandle, Mesh};
use crate::scene::Transform;

/// FBX time unit: ticks per second.
pub const TICKS_PER_SECOND: f64 = 46_186_158_000.0;

const FALLBACK_SPECULAR: u32 = 0x0011_1111;

#[derive(Debug, Clone, Copy, Default)]
pub struct FbxLoader;

impl FbxLoader {
    pub fn decode(&self, bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<Prefab, DecodeError> {
        if !binary::is_binary(bytes) {
            let text = bytes.iter().take(256).all(|b| b.is_ascii());
            return Err(DecodeError::Fbx(if text {
                "ASCII FBX files are not supported; export as binary FBX".to_string()
            } else {
                "not an FBX file".to_string()
            }));
        }
        let document = binary::parse(bytes).map_err(DecodeError::Fbx)?;

        let graph = ObjectGraph::new(&document)?;
        let mut prefab = Prefab::new(root_name(ctx.locator));
        let models = graph.build_nodes(&mut prefab)?;
        prefab.animations = graph.build_animations(&models);
        Ok(prefab)
    }
}

// ============================================================================
// Object graph
// ============================================================================

struct Link<'a> {
    id: i64,
    property: Option<&'a str>,
}

/// Data about an instantiated model needed by animation binding.
struct ModelInfo {
    name: String,
    pre_rotation: Quat,
    transform: Transform,
}

struct ObjectGraph<'a> {
    /// Every object record, keyed by id.
    objects: FxHashMap<i64, FbxNode<'a>>,
    /// Object ids in file order.
    order: Vec<i64>,
    children: FxHashMap<i64, Vec<Link<'a>>>,
    parents: FxHashMap<i64, Vec<Link<'a>>>,
}

impl<'a> ObjectGraph<'a> {
    fn new(document: &'a FbxDocument) -> Result<Self, DecodeError> {
        let objects_node = document
            .node("Objects")
            .ok_or_else(|| DecodeError::Fbx("missing `Objects` section".to_string()))?;

        let mut objects = FxHashMap::default();
        let mut order = Vec::new();
        for node in objects_node.children() {
            if let Some(id) = node.id() {
                objects.insert(id, node);
                order.push(id);
            }
        }

        let mut children: FxHashMap<i64, Vec<Link<'a>>> = FxHashMap::default();
        let mut parents: FxHashMap<i64, Vec<Link<'a>>> = FxHashMap::default();
        if let Some(connections) = document.node("Connections") {
            for c in connections.children_named("C") {
                let (Some(child), Some(parent)) = (
                    c.property(1).and_then(AttributeExt::int),
                    c.property(2).and_then(AttributeExt::int),
                ) else {
                    continue;
                };
                let property = c.property(3).and_then(AttributeExt::text);
                children.entry(parent).or_default().push(Link { id: child, property });
                parents.entry(child).or_default().push(Link { id: parent, property });
            }
        }

        Ok(Self {
            objects,
            order,
            children,
            parents,
        })
    }

    fn class_of(&self, id: i64) -> Option<&'a str> {
        self.objects.get(&id).map(|node| node.name())
    }

    fn children_of(&self, id: i64, class: &'a str) -> impl Iterator<Item = &Link<'a>> + '_ {
        self.children
            .get(&id)
            .into_iter()
            .flatten()
            .filter(move |link| self.class_of(link.id) == Some(class))
    }

    fn parents_of(&self, id: i64, class: &'a str) -> impl Iterator<Item = &Link<'a>> + '_ {
        self.parents
            .get(&id)
            .into_iter()
            .flatten()
            .filter(move |link| self.class_of(link.id) == Some(class))
    }

    // ========================================================================
    // Models, geometry, materials
    // ========================================================================

    /// Adds every model to the prefab, parents first. Returns the models
    /// by id for animation binding.
    fn build_nodes(&self, prefab: &mut Prefab) -> Result<FxHashMap<i64, ModelInfo>, DecodeError> {
        let mut infos = FxHashMap::default();
        let mut materials: FxHashMap<i64, MaterialHandle> = FxHashMap::default();
        let mut geometries: FxHashMap<i64, GeometryHandle> = FxHashMap::default();
        let mut fallback: Option<MaterialHandle> = None;

        let roots: Vec<i64> = self
            .order
            .iter()
            .copied()
            .filter(|&id| self.class_of(id) == Some("Model"))
            .filter(|&id| self.parents_of(id, "Model").next().is_none())
            .collect();

        let mut stack: Vec<(i64, usize)> = roots.into_iter().rev().map(|id| (id, Prefab::ROOT)).collect();
        while let Some((id, parent)) = stack.pop() {
            if infos.contains_key(&id) {
                continue;
            }
            let Some(&model) = self.objects.get(&id) else {
                continue;
            };

            let props = Properties70::of(model);
            let pre_rotation = props.vec3("PreRotation").map_or(Quat::IDENTITY, euler_degrees);
            let transform = Transform::from_trs(
                props.vec3("Lcl Translation").unwrap_or(Vec3::ZERO),
                pre_rotation * props.vec3("Lcl Rotation").map_or(Quat::IDENTITY, euler_degrees),
                props.vec3("Lcl Scaling").unwrap_or(Vec3::ONE),
            );
            let name = match model.object_name() {
                "" => format!("Model_{id}"),
                name => name.to_string(),
            };

            let mut node = PrefabNode::new(name.as_str()).with_transform(transform.clone());
            if let Some(geometry_id) = self
                .children_of(id, "Geometry")
                .map(|link| link.id)
                .find(|gid| self.objects.get(gid).is_some_and(|g| is_mesh_geometry(*g)))
            {
                let geometry = match geometries.get(&geometry_id) {
                    Some(handle) => *handle,
                    None => {
                        let mut geometry = build_geometry(self.objects[&geometry_id])?;
                        geometry.name = self.objects[&geometry_id].object_name().to_string();
                        let handle = prefab.assets.geometries.add(geometry);
                        geometries.insert(geometry_id, handle);
                        handle
                    }
                };

                let material = match self.children_of(id, "Material").next() {
                    Some(link) => *materials.entry(link.id).or_insert_with(|| {
                        prefab.assets.materials.add(build_material(self.objects[&link.id]))
                    }),
                    None => *fallback.get_or_insert_with(|| {
                        prefab.assets.materials.add(Material::fallback(FALLBACK_SPECULAR))
                    }),
                };
                node = node.with_mesh(Mesh::new(geometry, material).with_name(name.as_str()));
            }

            let index = prefab.add_node(parent, node);
            infos.insert(
                id,
                ModelInfo {
                    name,
                    pre_rotation,
                    transform,
                },
            );

            let child_models: Vec<i64> = self.children_of(id, "Model").map(|link| link.id).collect();
            stack.extend(child_models.into_iter().rev().map(|child| (child, index)));
        }

        Ok(infos)
    }

    // ========================================================================
    // Animation
    // ========================================================================

    fn build_animations(&self, models: &FxHashMap<i64, ModelInfo>) -> Vec<AnimationClip> {
        let mut clips = Vec::new();

        for &stack_id in &self.order {
            if self.class_of(stack_id) != Some("AnimationStack") {
                continue;
            }
            let stack = self.objects[&stack_id];
            let mut tracks = Vec::new();

            for layer in self.children_of(stack_id, "AnimationLayer") {
                for curve_node in self.children_of(layer.id, "AnimationCurveNode") {
                    if let Some(track) = self.build_track(curve_node.id, models) {
                        tracks.push(track);
                    }
                }
            }

            let name = match stack.object_name() {
                "" => format!("Take_{}", clips.len()),
                name => name.to_string(),
            };
            log::debug!("FBX animation `{name}`: {} tracks", tracks.len());
            clips.push(AnimationClip::new(name, tracks));
        }
        clips
    }

    fn build_track(&self, curve_node_id: i64, models: &FxHashMap<i64, ModelInfo>) -> Option<Track> {
        let (model, target) = self.parents_of(curve_node_id, "Model").find_map(|link| {
            let target = match link.property? {
                "Lcl Translation" => TargetPath::Translation,
                "Lcl Rotation" => TargetPath::Rotation,
                "Lcl Scaling" => TargetPath::Scale,
                _ => return None,
            };
            Some((models.get(&link.id)?, target))
        })?;

        let curve_node = self.objects[&curve_node_id];
        let defaults = Properties70::of(curve_node);
        let rest = match target {
            TargetPath::Translation => model.transform.position,
            TargetPath::Scale => model.transform.scale,
            TargetPath::Rotation => {
                let (z, y, x) = (model.pre_rotation.inverse() * model.transform.rotation).to_euler(EulerRot::ZYX);
                Vec3::new(x, y, z) * (180.0 / std::f32::consts::PI)
            }
        };

        let mut axes: [Option<Curve>; 3] = [None, None, None];
        for link in self.children_of(curve_node_id, "AnimationCurve") {
            let axis = match link.property {
                Some("d|X") => 0,
                Some("d|Y") => 1,
                Some("d|Z") => 2,
                _ => continue,
            };
            axes[axis] = Curve::read(self.objects[&link.id]);
        }
        if axes.iter().all(Option::is_none) {
            return None;
        }

        let base = [
            defaults.scalar("d|X").map_or(rest.x, |v| v as f32),
            defaults.scalar("d|Y").map_or(rest.y, |v| v as f32),
            defaults.scalar("d|Z").map_or(rest.z, |v| v as f32),
        ];

        let mut times: Vec<f64> = axes.iter().flatten().flat_map(|c| c.times.iter().copied()).collect();
        times.sort_by(f64::total_cmp);
        times.dedup_by(|a, b| (*a - *b).abs() < 1e-9);

        let sample = |t: f64| {
            let mut v = [0.0_f32; 3];
            for (i, slot) in v.iter_mut().enumerate() {
                *slot = axes[i].as_ref().map_or(base[i], |c| c.evaluate(t) as f32);
            }
            Vec3::from_array(v)
        };
        let key_times: Vec<f32> = times.iter().map(|&t| t as f32).collect();

        let data = match target {
            TargetPath::Rotation => {
                let values = times
                    .iter()
                    .map(|&t| model.pre_rotation * euler_degrees(sample(t)))
                    .collect();
                TrackData::Quaternion(KeyframeTrack::new(key_times, values, InterpolationMode::Linear))
            }
            TargetPath::Translation | TargetPath::Scale => {
                let values = times.iter().map(|&t| sample(t)).collect();
                TrackData::Vector3(KeyframeTrack::new(key_times, values, InterpolationMode::Linear))
            }
        };

        Some(Track {
            meta: TrackMeta {
                node_name: model.name.clone(),
                target,
            },
            data,
        })
    }
}

// ============================================================================
// Records
// ============================================================================

/// `Properties70` block: `P` records of `[name, type, label, flags, values...]`.
struct Properties70<'a> {
    entries: FxHashMap<&'a str, FbxNode<'a>>,
}

impl<'a> Properties70<'a> {
    fn of(node: FbxNode<'a>) -> Self {
        let entries = node
            .child("Properties70")
            .into_iter()
            .flat_map(|block| block.children_named("P"))
            .filter_map(|p| Some((p.property(0)?.text()?, p)))
            .collect();
        Self { entries }
    }

    fn value(&self, name: &str, offset: usize) -> Option<f64> {
        self.entries.get(name)?.property(4 + offset)?.float()
    }

    fn scalar(&self, name: &str) -> Option<f64> {
        self.value(name, 0)
    }

    fn vec3(&self, name: &str) -> Option<Vec3> {
        Some(Vec3::new(
            self.value(name, 0)? as f32,
            self.value(name, 1)? as f32,
            self.value(name, 2)? as f32,
        ))
    }
}

/// FBX default rotation order: X, then Y, then Z (extrinsic).
fn euler_degrees(degrees: Vec3) -> Quat {
    let r = degrees * (std::f32::consts::PI / 180.0);
    Quat::from_euler(EulerRot::ZYX, r.z, r.y, r.x)
}

fn is_mesh_geometry(node: FbxNode<'_>) -> bool {
    node.property(2)
        .and_then(AttributeExt::text)
        .is_none_or(|class| class == "Mesh")
}

struct Curve {
    times: Vec<f64>,
    values: Vec<f64>,
}

impl Curve {
    fn read(node: FbxNode<'_>) -> Option<Self> {
        let ticks = node.child_value("KeyTime")?.ints()?;
        let values = node
            .child_value("KeyValueFloat")
            .or_else(|| node.child_value("KeyValueDouble"))?
            .floats()?;
        let len = ticks.len().min(values.len());
        if len == 0 {
            return None;
        }
        Some(Self {
            times: ticks[..len].iter().map(|&t| t as f64 / TICKS_PER_SECOND).collect(),
            values: values[..len].to_vec(),
        })
    }

    /// Linear interpolation, clamped to the first and last key.
    fn evaluate(&self, t: f64) -> f64 {
        let i = self.times.partition_point(|&k| k <= t);
        if i == 0 {
            return self.values[0];
        }
        if i >= self.times.len() {
            return self.values[self.values.len() - 1];
        }
        let (t0, t1) = (self.times[i - 1], self.times[i]);
        let (v0, v1) = (self.values[i - 1], self.values[i]);
        let span = t1 - t0;
        if span <= f64::EPSILON {
            v1
        } else {
            v0 + (v1 - v0) * ((t - t0) / span)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mapping {
    ByPolygonVertex,
    ByVertex,
    ByPolygon,
    AllSame,
}

/// `LayerElement*` block resolved to a per-polygon-vertex lookup.
struct LayerElement {
    mapping: Mapping,
    direct: Vec<f64>,
    index: Option<Vec<i64>>,
    width: usize,
}

impl LayerElement {
    fn read(geometry: FbxNode<'_>, element: &str, data: &str, index: &str, width: usize) -> Option<Self> {
        let layer = geometry.child(element)?;
        let mapping = match layer.child_value("MappingInformationType")?.text()? {
            "ByPolygonVertex" => Mapping::ByPolygonVertex,
            "ByVertex" | "ByVertice" | "ByControlPoint" => Mapping::ByVertex,
            "ByPolygon" => Mapping::ByPolygon,
            "AllSame" => Mapping::AllSame,
            other => {
                log::warn!("Unsupported FBX {element} mapping `{other}`");
                return None;
            }
        };
        let indexed = matches!(
            layer.child_value("ReferenceInformationType")?.text()?,
            "IndexToDirect" | "Index"
        );
        Some(Self {
            mapping,
            direct: layer.child_value(data)?.floats()?,
            index: if indexed { Some(layer.child_value(index)?.ints()?) } else { None },
            width,
        })
    }

    fn lookup(&self, polygon_vertex: usize, vertex: usize, polygon: usize) -> Option<&[f64]> {
        let element = match self.mapping {
            Mapping::ByPolygonVertex => polygon_vertex,
            Mapping::ByVertex => vertex,
            Mapping::ByPolygon => polygon,
            Mapping::AllSame => 0,
        };
        let element = match &self.index {
            Some(index) => usize::try_from(*index.get(element)?).ok()?,
            None => element,
        };
        self.direct.get(element * self.width..(element + 1) * self.width)
    }
}

/// Expands a `Geometry` record into one vertex per polygon corner, with
/// polygons fan-triangulated.
fn build_geometry(node: FbxNode<'_>) -> Result<Geometry, DecodeError> {
    let malformed = |what: &str| DecodeError::Fbx(format!("geometry `{}`: {what}", node.object_name()));

    let control_points: Vec<Vec3> = node
        .child_value("Vertices")
        .and_then(AttributeExt::floats)
        .ok_or_else(|| malformed("missing Vertices"))?
        .chunks_exact(3)
        .map(|p| Vec3::new(p[0] as f32, p[1] as f32, p[2] as f32))
        .collect();
    let polygon_vertices = node
        .child_value("PolygonVertexIndex")
        .and_then(AttributeExt::ints)
        .ok_or_else(|| malformed("missing PolygonVertexIndex"))?;

    let normal_layer = LayerElement::read(node, "LayerElementNormal", "Normals", "NormalsIndex", 3);
    let uv_layer = LayerElement::read(node, "LayerElementUV", "UV", "UVIndex", 2);

    let mut positions = Vec::with_capacity(polygon_vertices.len());
    let mut normals: Vec<Vec3> = Vec::new();
    let mut uvs: Vec<Vec2> = Vec::new();
    let mut normals_complete = normal_layer.is_some();
    let mut uvs_complete = uv_layer.is_some();
    let mut indices = Vec::with_capacity(polygon_vertices.len() * 2);

    let mut polygon = 0_usize;
    let mut polygon_start = 0_usize;
    for (corner, &raw) in polygon_vertices.iter().enumerate() {
        let last = raw < 0;
        let vertex = usize::try_from(if last { !raw } else { raw }).map_err(|_| malformed("bad vertex index"))?;
        let position = *control_points
            .get(vertex)
            .ok_or_else(|| malformed("vertex index out of range"))?;
        positions.push(position);

        if let Some(layer) = normal_layer.as_ref().filter(|_| normals_complete) {
            match layer.lookup(corner, vertex, polygon) {
                Some(n) => normals.push(Vec3::new(n[0] as f32, n[1] as f32, n[2] as f32)),
                None => normals_complete = false,
            }
        }
        if let Some(layer) = uv_layer.as_ref().filter(|_| uvs_complete) {
            match layer.lookup(corner, vertex, polygon) {
                Some(t) => uvs.push(Vec2::new(t[0] as f32, t[1] as f32)),
                None => uvs_complete = false,
            }
        }

        if last {
            let start = polygon_start as u32;
            for k in (polygon_start + 1)..corner {
                indices.extend_from_slice(&[start, k as u32, k as u32 + 1]);
            }
            polygon += 1;
            polygon_start = corner + 1;
        }
    }

    let mut geometry = Geometry::from_positions(&positions);
    if normals_complete {
        geometry.set_normals(&normals);
    }
    if uvs_complete {
        geometry.set_uvs(&uvs);
    }
    geometry.set_indices(&indices);
    Ok(geometry)
}

fn build_material(node: FbxNode<'_>) -> Material {
    let props = Properties70::of(node);
    let diffuse = props
        .vec3("DiffuseColor")
        .or_else(|| props.vec3("Diffuse"))
        .unwrap_or(Vec3::splat(0.8));
    let specular = props
        .vec3("SpecularColor")
        .or_else(|| props.vec3("Specular"))
        .unwrap_or(crate::resources::material::rgb_from_hex(FALLBACK_SPECULAR));
    let shininess = props
        .scalar("Shininess")
        .or_else(|| props.scalar("ShininessExponent"))
        .unwrap_or(30.0) as f32;

    let mut material = Material::new_phong(diffuse.extend(1.0), specular, shininess).with_name(node.object_name());
    if let Some(emissive) = props.vec3("EmissiveColor") {
        material.emissive = emissive;
    }
    let opacity = props
        .scalar("Opacity")
        .or_else(|| props.scalar("TransparencyFactor").map(|t| 1.0 - t))
        .unwrap_or(1.0);
    if opacity < 1.0 {
        material.set_opacity(opacity as f32);
    }
    material
}
