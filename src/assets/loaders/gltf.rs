//! glTF 2.0 / GLB decoder.
//!
//! Buffers and images are resolved through the [`Transport`] relative to
//! the primary locator, so a `.gltf` served over HTTP or from the memory
//! store finds its `.bin` and textures the same way a local file does.
//!
//! [`Transport`]: crate::assets::io::Transport

use base64::Engine;
use glam::{Quat, Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::animation::{
    AnimationClip, InterpolationMode, KeyframeTrack, TargetPath, Track, TrackData, TrackMeta,
};
use crate::assets::loaders::{DecodeContext, DracoMesh, root_name};
use crate::assets::prefab::{Prefab, PrefabNode};
use crate::errors::DecodeError;
use crate::resources::{
    AlphaMode, Geometry, GeometryHandle, Material, MaterialHandle, Mesh, PrimitiveTopology, Side,
    Texture, TextureHandle,
};
use crate::scene::Transform;

const DRACO_EXTENSION: &str = "KHR_draco_mesh_compression";

#[derive(Debug, Clone, Copy, Default)]
pub struct GltfLoader;

/// Per-decode state: resolved buffers and the handles created so far.
struct GltfImport<'g> {
    gltf: &'g gltf::Gltf,
    buffers: Vec<Vec<u8>>,
    textures: Vec<Option<TextureHandle>>,
    materials: Vec<MaterialHandle>,
    default_material: Option<MaterialHandle>,
    geometries: FxHashMap<(usize, usize), GeometryHandle>,
}

impl GltfLoader {
    pub async fn decode(&self, bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<Prefab, DecodeError> {
        let gltf = gltf::Gltf::from_slice_without_validation(bytes)?;

        let required: Vec<&str> = gltf
            .extensions_required()
            .filter(|ext| *ext != DRACO_EXTENSION)
            .collect();
        if !required.is_empty() {
            log::warn!("glTF requires unsupported extensions {required:?}; display may be incorrect");
        }

        let buffers = load_buffers(&gltf, ctx).await?;
        let mut prefab = Prefab::new(root_name(ctx.locator));

        let mut import = GltfImport {
            gltf: &gltf,
            buffers,
            textures: Vec::new(),
            materials: Vec::new(),
            default_material: None,
            geometries: FxHashMap::default(),
        };

        import.load_textures(&mut prefab, ctx).await;
        import.load_materials(&mut prefab);
        import.load_nodes(&mut prefab, ctx)?;
        prefab.animations = import.load_animations();

        Ok(prefab)
    }
}

// ============================================================================
// Buffers and images
// ============================================================================

async fn load_buffers(gltf: &gltf::Gltf, ctx: &DecodeContext<'_>) -> Result<Vec<Vec<u8>>, DecodeError> {
    let pending = gltf.buffers().map(|buffer| async move {
        match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .ok_or_else(|| DecodeError::Malformed("GLB buffer without a binary chunk".to_string())),
            gltf::buffer::Source::Uri(uri) => load_uri(uri, ctx).await,
        }
    });
    let mut buffers = futures::future::try_join_all(pending).await?;

    for (buffer, data) in gltf.buffers().zip(&mut buffers) {
        if data.len() < buffer.length() {
            return Err(DecodeError::Malformed(format!(
                "buffer {} holds {} bytes, {} declared",
                buffer.index(),
                data.len(),
                buffer.length()
            )));
        }
    }
    Ok(buffers)
}

/// Resolves a `data:` URI inline, or fetches a sibling resource.
async fn load_uri(uri: &str, ctx: &DecodeContext<'_>) -> Result<Vec<u8>, DecodeError> {
    if let Some(rest) = uri.strip_prefix("data:") {
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| DecodeError::Malformed(format!("invalid data URI `{}`", truncate(uri))))?;
        if !header.ends_with(";base64") {
            return Err(DecodeError::Malformed(format!(
                "data URI `{}` is not base64 encoded",
                truncate(uri)
            )));
        }
        return Ok(base64::engine::general_purpose::STANDARD.decode(payload)?);
    }
    let locator = ctx.locator.join(uri)?;
    Ok(ctx.transport.fetch_quiet(&locator).await?)
}

fn truncate(uri: &str) -> &str {
    let end = uri.char_indices().nth(48).map_or(uri.len(), |(i, _)| i);
    &uri[..end]
}

impl GltfImport<'_> {
    /// Decodes every image. A failing image is logged and its textures
    /// stay empty.
    async fn load_textures(&mut self, prefab: &mut Prefab, ctx: &DecodeContext<'_>) {
        let mut images: Vec<Option<TextureHandle>> = Vec::new();

        for image in self.gltf.images() {
            let name = image
                .name()
                .map_or_else(|| format!("image_{}", image.index()), str::to_string);
            let decoded = match image.source() {
                gltf::image::Source::View { view, .. } => {
                    let start = view.offset();
                    let end = start + view.length();
                    self.buffers
                        .get(view.buffer().index())
                        .and_then(|buffer| buffer.get(start..end))
                        .ok_or_else(|| DecodeError::Malformed(format!("image view {} out of range", view.index())))
                        .and_then(|bytes| Ok(Texture::from_encoded(name.as_str(), bytes)?))
                }
                gltf::image::Source::Uri { uri, .. } => match load_uri(uri, ctx).await {
                    Ok(bytes) => Texture::from_encoded(name.as_str(), &bytes)
                        .map(|t| t.with_source(uri))
                        .map_err(DecodeError::from),
                    Err(e) => Err(e),
                },
            };

            images.push(match decoded {
                Ok(texture) => Some(prefab.assets.textures.add(texture)),
                Err(e) => {
                    log::warn!("Skipping glTF image `{name}`: {e}");
                    None
                }
            });
        }

        self.textures = self
            .gltf
            .textures()
            .map(|texture| images.get(texture.source().index()).copied().flatten())
            .collect();
    }

    fn texture(&self, index: usize) -> Option<TextureHandle> {
        self.textures.get(index).copied().flatten()
    }

    fn load_materials(&mut self, prefab: &mut Prefab) {
        for material in self.gltf.materials() {
            let pbr = material.pbr_metallic_roughness();
            let mut mat = Material::new_standard(
                Vec4::from_array(pbr.base_color_factor()),
                pbr.roughness_factor(),
                pbr.metallic_factor(),
            );
            mat.name = material
                .name()
                .map_or_else(|| format!("material_{}", material.index().unwrap_or(0)), str::to_string);
            mat.emissive = Vec3::from_array(material.emissive_factor());

            mat.map = pbr.base_color_texture().and_then(|info| self.texture(info.texture().index()));
            mat.roughness_metalness_map = pbr
                .metallic_roughness_texture()
                .and_then(|info| self.texture(info.texture().index()));
            mat.normal_map = material
                .normal_texture()
                .and_then(|info| self.texture(info.texture().index()));
            mat.emissive_map = material
                .emissive_texture()
                .and_then(|info| self.texture(info.texture().index()));

            mat.alpha_mode = match material.alpha_mode() {
                gltf::material::AlphaMode::Opaque => AlphaMode::Opaque,
                gltf::material::AlphaMode::Mask => AlphaMode::Mask,
                gltf::material::AlphaMode::Blend => AlphaMode::Blend,
            };
            mat.transparent = mat.alpha_mode == AlphaMode::Blend;
            if material.double_sided() {
                mat.side = Side::Double;
            }

            self.materials.push(prefab.assets.materials.add(mat));
        }
    }

    fn material(&mut self, prefab: &mut Prefab, index: Option<usize>) -> MaterialHandle {
        if let Some(handle) = index.and_then(|i| self.materials.get(i)) {
            return *handle;
        }
        *self.default_material.get_or_insert_with(|| {
            let material = Material::new_standard(Vec4::ONE, 1.0, 1.0).with_name("default");
            prefab.assets.materials.add(material)
        })
    }

    // ========================================================================
    // Nodes and meshes
    // ========================================================================

    /// Walks the default (or first) scene top-down, so every prefab node
    /// is appended after its parent.
    fn load_nodes(&mut self, prefab: &mut Prefab, ctx: &DecodeContext<'_>) -> Result<(), DecodeError> {
        let Some(scene) = self.gltf.default_scene().or_else(|| self.gltf.scenes().next()) else {
            log::warn!("glTF has no scenes");
            return Ok(());
        };

        let mut stack: Vec<(gltf::Node<'_>, usize)> = scene.nodes().map(|node| (node, Prefab::ROOT)).collect();
        stack.reverse();
        let mut visited = vec![false; self.gltf.nodes().len()];

        while let Some((node, parent)) = stack.pop() {
            if std::mem::replace(&mut visited[node.index()], true) {
                log::warn!("glTF node {} is referenced more than once; ignoring the repeat", node.index());
                continue;
            }

            let (translation, rotation, scale) = node.transform().decomposed();
            let transform = Transform::from_trs(
                Vec3::from_array(translation),
                Quat::from_array(rotation),
                Vec3::from_array(scale),
            );
            let name = node_name(&node);
            let index = prefab.add_node(parent, PrefabNode::new(name.as_str()).with_transform(transform));

            if let Some(mesh) = node.mesh() {
                self.load_mesh(prefab, index, &name, &mesh, ctx)?;
            }

            let first_child = stack.len();
            stack.extend(node.children().map(|child| (child, index)));
            stack[first_child..].reverse();
        }
        Ok(())
    }

    /// A single-primitive mesh sits on the node itself; otherwise each
    /// primitive becomes a child node.
    fn load_mesh(
        &mut self,
        prefab: &mut Prefab,
        node_index: usize,
        node_name: &str,
        mesh: &gltf::Mesh<'_>,
        ctx: &DecodeContext<'_>,
    ) -> Result<(), DecodeError> {
        let single = mesh.primitives().len() == 1;

        for primitive in mesh.primitives() {
            let key = (mesh.index(), primitive.index());
            let geometry = match self.geometries.get(&key) {
                Some(handle) => *handle,
                None => {
                    let mut geometry = self.load_primitive_geometry(&primitive, ctx)?;
                    geometry.name = mesh
                        .name()
                        .map_or_else(|| format!("mesh_{}", mesh.index()), str::to_string);
                    let handle = prefab.assets.geometries.add(geometry);
                    self.geometries.insert(key, handle);
                    handle
                }
            };
            let material = self.material(prefab, primitive.material().index());

            if single {
                prefab.nodes[node_index].mesh = Some(Mesh::new(geometry, material).with_name(node_name));
            } else {
                let name = format!("{node_name}_{}", primitive.index());
                let mesh = Mesh::new(geometry, material).with_name(name.as_str());
                prefab.add_node(node_index, PrefabNode::new(name).with_mesh(mesh));
            }
        }
        Ok(())
    }

    fn load_primitive_geometry(
        &self,
        primitive: &gltf::Primitive<'_>,
        ctx: &DecodeContext<'_>,
    ) -> Result<Geometry, DecodeError> {
        let mut geometry = Geometry::new();
        geometry.topology = match primitive.mode() {
            gltf::mesh::Mode::Triangles => PrimitiveTopology::TriangleList,
            gltf::mesh::Mode::Lines => PrimitiveTopology::LineList,
            gltf::mesh::Mode::Points => PrimitiveTopology::PointList,
            other => {
                return Err(DecodeError::Malformed(format!("unsupported primitive mode {other:?}")));
            }
        };

        if let Some(draco) = primitive
            .extensions()
            .and_then(|ext| ext.get(DRACO_EXTENSION))
        {
            let mesh = self.decode_draco(draco, ctx)?;
            apply_draco(&mut geometry, &mesh);
            return Ok(geometry);
        }

        let reader = primitive.reader(|buffer| self.buffers.get(buffer.index()).map(Vec::as_slice));

        let positions: Vec<Vec3> = reader
            .read_positions()
            .ok_or_else(|| DecodeError::Malformed("primitive without POSITION".to_string()))?
            .map(Vec3::from_array)
            .collect();
        geometry.set_positions(&positions);

        if let Some(normals) = reader.read_normals() {
            let normals: Vec<Vec3> = normals.map(Vec3::from_array).collect();
            geometry.set_normals(&normals);
        }
        if let Some(uvs) = reader.read_tex_coords(0) {
            let uvs: Vec<Vec2> = uvs.into_f32().map(Vec2::from_array).collect();
            geometry.set_uvs(&uvs);
        }
        if let Some(colors) = reader.read_colors(0) {
            let colors: Vec<Vec4> = colors.into_rgba_f32().map(Vec4::from_array).collect();
            geometry.set_colors(&colors);
        }
        if let Some(indices) = reader.read_indices() {
            let indices: Vec<u32> = indices.into_u32().collect();
            geometry.set_indices(&indices);
        }

        Ok(geometry)
    }

    fn decode_draco(&self, extension: &serde_json::Value, ctx: &DecodeContext<'_>) -> Result<DracoMesh, DecodeError> {
        let Some(module) = ctx.draco else {
            return Err(DecodeError::Draco(
                "primitive is Draco-compressed but no Draco decoder is registered".to_string(),
            ));
        };

        let view_index = extension
            .get("bufferView")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| DecodeError::Malformed("Draco extension without bufferView".to_string()))?;
        let view = self
            .gltf
            .views()
            .nth(view_index as usize)
            .ok_or_else(|| DecodeError::Malformed(format!("Draco bufferView {view_index} does not exist")))?;
        let start = view.offset();
        let data = self
            .buffers
            .get(view.buffer().index())
            .and_then(|buffer| buffer.get(start..start + view.length()))
            .ok_or_else(|| DecodeError::Malformed(format!("Draco bufferView {view_index} out of range")))?;

        let attributes: Vec<(String, u32)> = extension
            .get("attributes")
            .and_then(serde_json::Value::as_object)
            .map(|map| {
                map.iter()
                    .filter_map(|(name, id)| Some((name.clone(), u32::try_from(id.as_u64()?).ok()?)))
                    .collect()
            })
            .unwrap_or_default();

        module.decode(&ctx.config.draco_decoder_path, data, &attributes)
    }

    // ========================================================================
    // Animations
    // ========================================================================

    fn load_animations(&self) -> Vec<AnimationClip> {
        let mut clips = Vec::new();

        for anim in self.gltf.animations() {
            let mut tracks = Vec::new();

            for channel in anim.channels() {
                let reader = channel.reader(|buffer| self.buffers.get(buffer.index()).map(Vec::as_slice));
                let target = channel.target();
                let node_name = node_name(&target.node());

                let Some(inputs) = reader.read_inputs() else {
                    log::warn!("Animation channel for `{node_name}` has no keyframe times");
                    continue;
                };
                let times: Vec<f32> = inputs.collect();

                let interpolation = match channel.sampler().interpolation() {
                    gltf::animation::Interpolation::Linear => InterpolationMode::Linear,
                    gltf::animation::Interpolation::Step => InterpolationMode::Step,
                    gltf::animation::Interpolation::CubicSpline => InterpolationMode::CubicSpline,
                };

                let Some(outputs) = reader.read_outputs() else {
                    continue;
                };
                let (target_path, data) = match outputs {
                    gltf::animation::util::ReadOutputs::Translations(iter) => (
                        TargetPath::Translation,
                        TrackData::Vector3(KeyframeTrack::new(times, iter.map(Vec3::from_array).collect(), interpolation)),
                    ),
                    gltf::animation::util::ReadOutputs::Rotations(iter) => (
                        TargetPath::Rotation,
                        TrackData::Quaternion(KeyframeTrack::new(
                            times,
                            iter.into_f32().map(Quat::from_array).collect(),
                            interpolation,
                        )),
                    ),
                    gltf::animation::util::ReadOutputs::Scales(iter) => (
                        TargetPath::Scale,
                        TrackData::Vector3(KeyframeTrack::new(times, iter.map(Vec3::from_array).collect(), interpolation)),
                    ),
                    gltf::animation::util::ReadOutputs::MorphTargetWeights(_) => {
                        log::debug!("Skipping morph-target weights track on `{node_name}`");
                        continue;
                    }
                };

                tracks.push(Track {
                    meta: TrackMeta {
                        node_name,
                        target: target_path,
                    },
                    data,
                });
            }

            let name = anim
                .name()
                .map_or_else(|| format!("animation_{}", anim.index()), str::to_string);
            clips.push(AnimationClip::new(name, tracks));
        }

        clips
    }
}

fn node_name(node: &gltf::Node<'_>) -> String {
    node.name()
        .map_or_else(|| format!("Node_{}", node.index()), str::to_string)
}

fn apply_draco(geometry: &mut Geometry, mesh: &DracoMesh) {
    geometry.set_positions(&mesh.positions);
    if let Some(normals) = &mesh.normals {
        geometry.set_normals(normals);
    }
    if let Some(uvs) = &mesh.uvs {
        geometry.set_uvs(uvs);
    }
    if let Some(colors) = &mesh.colors {
        geometry.set_colors(colors);
    }
    if !mesh.indices.is_empty() {
        geometry.set_indices(&mesh.indices);
    }
}
