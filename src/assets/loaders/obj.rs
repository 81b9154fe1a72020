//! Wavefront OBJ decoder with its companion MTL library.
//!
//! The material library is fetched before parsing: the explicit override
//! from the request, otherwise the same-basename `.mtl`. A missing or
//! broken library never fails the load; every mesh then gets the uniform
//! fallback material.

use std::io::{BufReader, Cursor};

use glam::{Vec2, Vec3, Vec4};
use rustc_hash::FxHashMap;

use crate::assets::loaders::{DecodeContext, root_name};
use crate::assets::locator::Locator;
use crate::assets::prefab::Prefab;
use crate::errors::DecodeError;
use crate::resources::{Geometry, Material, MaterialHandle, Texture, TextureHandle};

/// Specular tint of the material used when no MTL library is available.
const FALLBACK_SPECULAR: u32 = 0x0022_2222;

#[derive(Debug, Clone, Copy, Default)]
pub struct ObjLoader;

struct MaterialLibrary {
    locator: Locator,
    bytes: Vec<u8>,
}

impl ObjLoader {
    pub async fn decode(&self, bytes: &[u8], ctx: &DecodeContext<'_>) -> Result<Prefab, DecodeError> {
        let library = fetch_library(ctx).await;

        // `usemtl` names only resolve once a library is declared; the
        // fetched library stands in for whatever `mtllib` says.
        let mut source = Vec::with_capacity(bytes.len() + 24);
        if library.is_some() && !declares_library(bytes) {
            source.extend_from_slice(b"mtllib companion.mtl\n");
        }
        source.extend_from_slice(bytes);

        let options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };
        let mtl_bytes = library.as_ref().map(|lib| lib.bytes.as_slice());
        let (models, materials) = tobj::load_obj_buf(&mut BufReader::new(Cursor::new(source)), &options, |_| {
            match mtl_bytes {
                Some(mtl) => tobj::load_mtl_buf(&mut BufReader::new(Cursor::new(mtl))),
                None => Err(tobj::LoadError::OpenFileFailed),
            }
        })?;

        let mut prefab = Prefab::new(root_name(ctx.locator));

        let materials = match (materials, &library) {
            (Ok(materials), Some(library)) if !materials.is_empty() => {
                convert_materials(&mut prefab, &materials, &library.locator, ctx).await
            }
            (Err(e), Some(library)) => {
                log::warn!("Failed to parse MTL `{}`: {e}; using default material", library.locator);
                Vec::new()
            }
            _ => Vec::new(),
        };
        let mut fallback: Option<MaterialHandle> = None;

        for (i, model) in models.iter().enumerate() {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }

            let name = if model.name.is_empty() {
                format!("object_{i}")
            } else {
                model.name.clone()
            };
            let mut geometry = build_geometry(mesh);
            geometry.name.clone_from(&name);

            let material = match mesh.material_id.and_then(|id| materials.get(id)) {
                Some(handle) => *handle,
                None => *fallback.get_or_insert_with(|| {
                    prefab.assets.materials.add(Material::fallback(FALLBACK_SPECULAR))
                }),
            };

            prefab.add_mesh_node(Prefab::ROOT, &name, geometry, material);
        }

        Ok(prefab)
    }
}

fn declares_library(bytes: &[u8]) -> bool {
    bytes
        .split(|&b| b == b'\n')
        .any(|line| line.trim_ascii_start().starts_with(b"mtllib"))
}

async fn fetch_library(ctx: &DecodeContext<'_>) -> Option<MaterialLibrary> {
    let locator = match ctx.material_override {
        Some(locator) => locator.clone(),
        None => {
            let Some(locator) = ctx.locator.with_extension("mtl") else {
                log::warn!("No MTL file found, using default material");
                return None;
            };
            locator
        }
    };

    match ctx.transport.fetch_quiet(&locator).await {
        Ok(bytes) => {
            log::debug!("Loaded material library `{locator}` ({} bytes)", bytes.len());
            Some(MaterialLibrary { locator, bytes })
        }
        Err(e) => {
            log::warn!("No MTL file found, using default material ({locator}: {e})");
            None
        }
    }
}

async fn convert_materials(
    prefab: &mut Prefab,
    materials: &[tobj::Material],
    library: &Locator,
    ctx: &DecodeContext<'_>,
) -> Vec<MaterialHandle> {
    let mut textures: FxHashMap<String, Option<TextureHandle>> = FxHashMap::default();
    let mut handles = Vec::with_capacity(materials.len());

    for m in materials {
        let diffuse = m.diffuse.map_or(Vec3::ONE, Vec3::from_array);
        let specular = m.specular.map_or(Vec3::splat(0x11 as f32 / 255.0), Vec3::from_array);
        let mut material = Material::new_phong(diffuse.extend(1.0), specular, m.shininess.unwrap_or(30.0))
            .with_name(m.name.as_str());
        if let Some(dissolve) = m.dissolve {
            material.set_opacity(dissolve);
        }

        if let Some(path) = m.diffuse_texture.as_deref().filter(|p| !p.is_empty()) {
            if !textures.contains_key(path) {
                let handle = load_texture(prefab, library, path, ctx).await;
                textures.insert(path.to_string(), handle);
            }
            material.map = textures.get(path).copied().flatten();
        }

        handles.push(prefab.assets.materials.add(material));
    }
    handles
}

async fn load_texture(
    prefab: &mut Prefab,
    library: &Locator,
    path: &str,
    ctx: &DecodeContext<'_>,
) -> Option<TextureHandle> {
    let result = async {
        let locator = library.join(path)?;
        let bytes = ctx.transport.fetch_quiet(&locator).await?;
        let texture = Texture::from_encoded(path, &bytes)?.with_source(locator.to_string());
        Ok::<_, DecodeError>(texture)
    }
    .await;

    match result {
        Ok(texture) => Some(prefab.assets.textures.add(texture)),
        Err(e) => {
            log::warn!("Failed to load texture `{path}`: {e}");
            None
        }
    }
}

fn build_geometry(mesh: &tobj::Mesh) -> Geometry {
    let positions: Vec<Vec3> = mesh
        .positions
        .chunks_exact(3)
        .map(|p| Vec3::new(p[0], p[1], p[2]))
        .collect();
    let vertex_count = positions.len();

    let mut geometry = Geometry::from_positions(&positions);

    if mesh.normals.len() == vertex_count * 3 {
        let normals: Vec<Vec3> = mesh
            .normals
            .chunks_exact(3)
            .map(|n| Vec3::new(n[0], n[1], n[2]))
            .collect();
        geometry.set_normals(&normals);
    }
    if mesh.texcoords.len() == vertex_count * 2 {
        let uvs: Vec<Vec2> = mesh.texcoords.chunks_exact(2).map(|t| Vec2::new(t[0], t[1])).collect();
        geometry.set_uvs(&uvs);
    }
    if mesh.vertex_color.len() == vertex_count * 3 {
        let colors: Vec<Vec4> = mesh
            .vertex_color
            .chunks_exact(3)
            .map(|c| Vec4::new(c[0], c[1], c[2], 1.0))
            .collect();
        geometry.set_colors(&colors);
    }
    if !mesh.indices.is_empty() {
        geometry.set_indices(&mesh.indices);
    }
    geometry
}
